// ==========================================
// 产线追溯系统 - 序列号仓储
// ==========================================
// 表: serial_unit / serial_history
// 红线: 历史记录与序列号行更新在同一事务内
// 红线: 检查-执行类操作（托盘独占 + 批量插入、批量过站）使用 IMMEDIATE 写事务
// 红线: 批量插入使用多行 VALUES 语句
// ==========================================

use crate::domain::serial::{HistoryEntry, NewSerialUnit, SerialUnit};
use crate::domain::tray::plan_batch_size;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::OrderRepository;
use crate::repository::sql_util::{
    format_ts, in_placeholders, now_ts, parse_ts, parse_ts_opt, row_placeholders,
    MAX_ROWS_PER_STATEMENT,
};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Row,
    TransactionBehavior,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// 事务结果
// ==========================================

/// 托盘批量生成请求
#[derive(Debug, Clone)]
pub struct TrayBatchRequest<'a> {
    pub tray_id: &'a str,
    pub order_number: &'a str,
    pub part_number_id: &'a str,
    pub operation_id: &'a str,
    pub operator_id: &'a str,
    pub requested: i64,
    pub tray_capacity: i64,
    /// 生成即完工，并关闭工单
    pub auto_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayBatchOutcome {
    Generated {
        serial_numbers: Vec<String>,
        order_closed: bool,
    },
    /// 托盘中存在其他工单的未完工单件
    TrayOccupied { blocking_order: String },
    OrderClosed,
    OrderFull { quantity: i64, assigned: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// 序列号已登记（可能属于其他工单）
    AlreadyRegistered { order_number: String },
    OrderClosed,
    OrderFull { quantity: i64, assigned: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { order_closed: bool },
    /// 已有本工序历史，不重复登记
    AlreadyAtStation,
    AlreadyComplete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub finalized: Vec<String>,
    pub closed_orders: Vec<String>,
}

// ==========================================
// SerialRepository - 序列号仓储
// ==========================================
pub struct SerialRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SerialRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 托盘批量生成序列号
    ///
    /// 在同一个 IMMEDIATE 事务内完成:
    /// 1. 托盘独占检查（其他工单的未完工单件）
    /// 2. 数量计算 min(托盘容量, 请求数量, 工单剩余)
    /// 3. 从 `已分配数 + 1` 开始分配流水号并生成序列号
    /// 4. 多行插入单件与首条历史
    ///
    /// 任一步失败整体回滚。
    ///
    /// # 参数
    /// - `make_serial`: 流水号 → 序列号
    pub fn generate_tray_batch<F>(
        &self,
        req: &TrayBatchRequest<'_>,
        make_serial: F,
    ) -> RepositoryResult<TrayBatchOutcome>
    where
        F: Fn(i64) -> Result<String, String>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let blocking: Option<String> = tx
            .query_row(
                r#"
                SELECT order_number FROM serial_unit
                WHERE tray_id = ?1 AND is_complete = 0 AND order_number <> ?2
                LIMIT 1
                "#,
                params![req.tray_id, req.order_number],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(blocking_order) = blocking {
            return Ok(TrayBatchOutcome::TrayOccupied { blocking_order });
        }

        let (quantity, status) = order_quantity_and_status(&tx, req.order_number)?;
        if status != "OPEN" {
            return Ok(TrayBatchOutcome::OrderClosed);
        }

        let assigned = OrderRepository::count_assigned_with(&tx, req.order_number)?;
        let qty = plan_batch_size(req.tray_capacity, req.requested, quantity, assigned);
        if qty <= 0 {
            return Ok(TrayBatchOutcome::OrderFull { quantity, assigned });
        }

        let serial_numbers = ((assigned + 1)..=(assigned + qty))
            .map(&make_serial)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RepositoryError::ValidationError)?;

        let ts = format_ts(&now_ts());
        let units: Vec<NewSerialUnit> = serial_numbers
            .iter()
            .map(|sn| NewSerialUnit {
                serial_number: sn.clone(),
                order_number: req.order_number.to_string(),
                part_number_id: req.part_number_id.to_string(),
                operation_id: req.operation_id.to_string(),
                tray_id: Some(req.tray_id.to_string()),
                is_complete: req.auto_complete,
                operator_id: req.operator_id.to_string(),
                test_recorded_at: None,
                test_firmware: None,
            })
            .collect();
        insert_unit_rows(&tx, &units)?;
        insert_history_rows(&tx, &serial_numbers, req.operation_id, req.operator_id, &ts)?;

        let order_closed = if req.auto_complete {
            tx.execute(
                "UPDATE work_order SET status = 'CLOSED' WHERE order_number = ?1 AND status = 'OPEN'",
                params![req.order_number],
            )? > 0
        } else {
            false
        };

        tx.commit()?;
        Ok(TrayBatchOutcome::Generated {
            serial_numbers,
            order_closed,
        })
    }

    /// 初始工位逐件登记
    ///
    /// 检查重复登记、工单状态与剩余数量后插入单件 + 首条历史。
    pub fn register_initial(&self, unit: &NewSerialUnit) -> RepositoryResult<RegisterOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT order_number FROM serial_unit WHERE serial_number = ?1",
                params![unit.serial_number],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(order_number) = existing {
            return Ok(RegisterOutcome::AlreadyRegistered { order_number });
        }

        let (quantity, status) = order_quantity_and_status(&tx, &unit.order_number)?;
        if status != "OPEN" {
            return Ok(RegisterOutcome::OrderClosed);
        }
        let assigned = OrderRepository::count_assigned_with(&tx, &unit.order_number)?;
        if assigned >= quantity {
            return Ok(RegisterOutcome::OrderFull { quantity, assigned });
        }

        let ts = format_ts(&now_ts());
        insert_unit_rows(&tx, std::slice::from_ref(unit))?;
        insert_history_rows(
            &tx,
            std::slice::from_ref(&unit.serial_number),
            &unit.operation_id,
            &unit.operator_id,
            &ts,
        )?;

        tx.commit()?;
        Ok(RegisterOutcome::Registered)
    }

    /// 单件过站（标准工位 / 最终工位）
    ///
    /// # 参数
    /// - `final_step`: 最终工位时同时置完工，并检查工单是否自动关闭
    pub fn advance_unit(
        &self,
        serial_number: &str,
        operation_id: &str,
        operator_id: &str,
        final_step: bool,
    ) -> RepositoryResult<AdvanceOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let unit = find_with(&tx, serial_number)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "SerialUnit".to_string(),
            id: serial_number.to_string(),
        })?;
        if unit.is_complete {
            return Ok(AdvanceOutcome::AlreadyComplete);
        }
        if has_history_at_with(&tx, serial_number, operation_id)? {
            return Ok(AdvanceOutcome::AlreadyAtStation);
        }

        let serials = [serial_number.to_string()];
        let ts = next_history_ts(&tx, &serials)?;
        insert_history_rows(&tx, &serials, operation_id, operator_id, &ts)?;
        tx.execute(
            "UPDATE serial_unit SET current_operation_id = ?1, is_complete = ?2 WHERE serial_number = ?3",
            params![operation_id, final_step as i32, serial_number],
        )?;

        let order_closed = if final_step {
            OrderRepository::close_if_complete_with(&tx, &unit.order_number, operation_id)?
        } else {
            false
        };

        tx.commit()?;
        Ok(AdvanceOutcome::Advanced { order_closed })
    }

    /// 托盘批量过站
    ///
    /// 过滤掉已完工或已有本工序历史的单件，其余一次性追加历史并更新当前工序。
    ///
    /// # 返回
    /// 实际过站的序列号
    pub fn mark_all(
        &self,
        serial_numbers: &[String],
        operation_id: &str,
        operator_id: &str,
    ) -> RepositoryResult<Vec<String>> {
        if serial_numbers.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let eligible = eligible_for_station(&tx, serial_numbers, operation_id)?;
        if eligible.is_empty() {
            return Ok(vec![]);
        }

        let ts = next_history_ts(&tx, &eligible)?;
        insert_history_rows(&tx, &eligible, operation_id, operator_id, &ts)?;
        for chunk in eligible.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "UPDATE serial_unit SET current_operation_id = ? WHERE serial_number IN ({})",
                in_placeholders(chunk.len())
            );
            let mut values: Vec<Value> = vec![Value::from(operation_id.to_string())];
            values.extend(chunk.iter().map(|s| Value::from(s.clone())));
            tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(eligible)
    }

    /// 最终工位整盘完工（不可逆）
    ///
    /// 未完工单件补写最终工序历史（已有则跳过），置完工；
    /// 涉及的工单逐个检查自动关闭。
    pub fn finalize(
        &self,
        serial_numbers: &[String],
        final_operation_id: &str,
        operator_id: &str,
    ) -> RepositoryResult<FinalizeOutcome> {
        if serial_numbers.is_empty() {
            return Ok(FinalizeOutcome::default());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut pending: Vec<(String, String)> = Vec::new();
        for chunk in serial_numbers.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "SELECT serial_number, order_number FROM serial_unit WHERE is_complete = 0 AND serial_number IN ({}) ORDER BY serial_number",
                in_placeholders(chunk.len())
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<SqliteResult<Vec<_>>>()?;
            pending.extend(rows);
        }
        if pending.is_empty() {
            return Ok(FinalizeOutcome::default());
        }

        let finalized: Vec<String> = pending.iter().map(|(s, _)| s.clone()).collect();
        let need_history = eligible_for_station(&tx, &finalized, final_operation_id)?;
        if !need_history.is_empty() {
            let ts = next_history_ts(&tx, &need_history)?;
            insert_history_rows(&tx, &need_history, final_operation_id, operator_id, &ts)?;
        }

        for chunk in finalized.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "UPDATE serial_unit SET current_operation_id = ?, is_complete = 1 WHERE serial_number IN ({})",
                in_placeholders(chunk.len())
            );
            let mut values: Vec<Value> = vec![Value::from(final_operation_id.to_string())];
            values.extend(chunk.iter().map(|s| Value::from(s.clone())));
            tx.execute(&sql, params_from_iter(values))?;
        }

        let orders: BTreeSet<String> = pending.into_iter().map(|(_, o)| o).collect();
        let mut closed_orders = Vec::new();
        for order_number in orders {
            if OrderRepository::close_if_complete_with(&tx, &order_number, final_operation_id)? {
                closed_orders.push(order_number);
            }
        }

        tx.commit()?;
        Ok(FinalizeOutcome {
            finalized,
            closed_orders,
        })
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find(&self, serial_number: &str) -> RepositoryResult<Option<SerialUnit>> {
        let conn = self.get_conn()?;
        Ok(find_with(&conn, serial_number)?)
    }

    /// 托盘内全部单件（按序列号排序）
    pub fn list_by_tray(&self, tray_id: &str) -> RepositoryResult<Vec<SerialUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE tray_id = ?1 ORDER BY serial_number",
            UNIT_SELECT
        ))?;
        let units = stmt
            .query_map(params![tray_id], map_unit_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(units)
    }

    pub fn list_by_tray_and_order(
        &self,
        tray_id: &str,
        order_number: &str,
    ) -> RepositoryResult<Vec<SerialUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE tray_id = ?1 AND order_number = ?2 ORDER BY serial_number",
            UNIT_SELECT
        ))?;
        let units = stmt
            .query_map(params![tray_id, order_number], map_unit_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(units)
    }

    pub fn list_by_order(&self, order_number: &str) -> RepositoryResult<Vec<SerialUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE order_number = ?1 ORDER BY serial_number",
            UNIT_SELECT
        ))?;
        let units = stmt
            .query_map(params![order_number], map_unit_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(units)
    }

    /// 过站历史（按写入顺序）
    pub fn history(&self, serial_number: &str) -> RepositoryResult<Vec<HistoryEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, serial_number, operation_id, operator_id, recorded_at
            FROM serial_history
            WHERE serial_number = ?1
            ORDER BY id
            "#,
        )?;
        let entries = stmt
            .query_map(params![serial_number], map_history_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn has_history_at(&self, serial_number: &str, operation_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        Ok(has_history_at_with(&conn, serial_number, operation_id)?)
    }

    /// 指定时间之后在工序上登记的过站记录数
    pub fn count_history_since(
        &self,
        operation_id: &str,
        since: &NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM serial_history WHERE operation_id = ?1 AND recorded_at >= ?2",
            params![operation_id, format_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ==========================================
// 事务内辅助函数
// ==========================================

const UNIT_SELECT: &str = r#"
    SELECT serial_number, order_number, part_number_id, current_operation_id, tray_id,
           is_complete, test_recorded_at, test_firmware
    FROM serial_unit
"#;

fn find_with(conn: &Connection, serial_number: &str) -> SqliteResult<Option<SerialUnit>> {
    conn.query_row(
        &format!("{} WHERE serial_number = ?1", UNIT_SELECT),
        params![serial_number],
        map_unit_row,
    )
    .optional()
}

fn has_history_at_with(conn: &Connection, serial_number: &str, operation_id: &str) -> SqliteResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM serial_history WHERE serial_number = ?1 AND operation_id = ?2 LIMIT 1",
            params![serial_number, operation_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn order_quantity_and_status(conn: &Connection, order_number: &str) -> RepositoryResult<(i64, String)> {
    conn.query_row(
        "SELECT quantity, status FROM work_order WHERE order_number = ?1",
        params![order_number],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )
    .optional()?
    .ok_or_else(|| RepositoryError::NotFound {
        entity: "WorkOrder".to_string(),
        id: order_number.to_string(),
    })
}

/// 未完工且没有本工序历史的序列号（保持输入顺序）
fn eligible_for_station(
    conn: &Connection,
    serial_numbers: &[String],
    operation_id: &str,
) -> SqliteResult<Vec<String>> {
    let mut found = BTreeSet::new();
    for chunk in serial_numbers.chunks(MAX_ROWS_PER_STATEMENT) {
        let sql = format!(
            r#"
            SELECT su.serial_number FROM serial_unit su
            WHERE su.serial_number IN ({})
              AND su.is_complete = 0
              AND NOT EXISTS (
                SELECT 1 FROM serial_history h
                WHERE h.serial_number = su.serial_number AND h.operation_id = ?
              )
            "#,
            in_placeholders(chunk.len())
        );
        let mut values: Vec<Value> = chunk.iter().map(|s| Value::from(s.clone())).collect();
        values.push(Value::from(operation_id.to_string()));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;
        found.extend(rows);
    }

    Ok(serial_numbers
        .iter()
        .filter(|s| found.contains(*s))
        .cloned()
        .collect())
}

/// 新历史记录的时间戳: max(当前时间, 这些单件已有的最新时间)
fn next_history_ts(conn: &Connection, serial_numbers: &[String]) -> SqliteResult<String> {
    let mut ts = format_ts(&now_ts());
    for chunk in serial_numbers.chunks(MAX_ROWS_PER_STATEMENT) {
        let sql = format!(
            "SELECT MAX(recorded_at) FROM serial_history WHERE serial_number IN ({})",
            in_placeholders(chunk.len())
        );
        let latest: Option<String> =
            conn.query_row(&sql, params_from_iter(chunk.iter()), |row| row.get(0))?;
        if let Some(latest) = latest {
            if latest > ts {
                ts = latest;
            }
        }
    }
    Ok(ts)
}

fn insert_unit_rows(conn: &Connection, units: &[NewSerialUnit]) -> SqliteResult<()> {
    for chunk in units.chunks(MAX_ROWS_PER_STATEMENT) {
        let sql = format!(
            r#"
            INSERT INTO serial_unit (
                serial_number, order_number, part_number_id, current_operation_id,
                tray_id, is_complete, test_recorded_at, test_firmware
            ) VALUES {}
            "#,
            row_placeholders(chunk.len(), 8)
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 8);
        for u in chunk {
            values.push(Value::from(u.serial_number.clone()));
            values.push(Value::from(u.order_number.clone()));
            values.push(Value::from(u.part_number_id.clone()));
            values.push(Value::from(u.operation_id.clone()));
            values.push(u.tray_id.clone().map(Value::from).unwrap_or(Value::Null));
            values.push(Value::from(u.is_complete as i64));
            values.push(
                u.test_recorded_at
                    .as_ref()
                    .map(|t| Value::from(format_ts(t)))
                    .unwrap_or(Value::Null),
            );
            values.push(u.test_firmware.clone().map(Value::from).unwrap_or(Value::Null));
        }
        conn.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}

fn insert_history_rows(
    conn: &Connection,
    serial_numbers: &[String],
    operation_id: &str,
    operator_id: &str,
    recorded_at: &str,
) -> SqliteResult<()> {
    for chunk in serial_numbers.chunks(MAX_ROWS_PER_STATEMENT) {
        let sql = format!(
            "INSERT INTO serial_history (serial_number, operation_id, operator_id, recorded_at) VALUES {}",
            row_placeholders(chunk.len(), 4)
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 4);
        for sn in chunk {
            values.push(Value::from(sn.clone()));
            values.push(Value::from(operation_id.to_string()));
            values.push(Value::from(operator_id.to_string()));
            values.push(Value::from(recorded_at.to_string()));
        }
        conn.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}

fn map_unit_row(row: &Row) -> SqliteResult<SerialUnit> {
    Ok(SerialUnit {
        serial_number: row.get(0)?,
        order_number: row.get(1)?,
        part_number_id: row.get(2)?,
        current_operation_id: row.get(3)?,
        tray_id: row.get(4)?,
        is_complete: row.get::<_, i32>(5)? != 0,
        test_recorded_at: parse_ts_opt(6, row.get(6)?)?,
        test_firmware: row.get(7)?,
    })
}

fn map_history_row(row: &Row) -> SqliteResult<HistoryEntry> {
    let recorded_at: String = row.get(4)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        serial_number: row.get(1)?,
        operation_id: row.get(2)?,
        operator_id: row.get(3)?,
        recorded_at: parse_ts(4, &recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn setup(quantity: i64) -> SerialRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO operation (id, name, order_index, is_initial) VALUES ('OP_INIT', 'Initial', 10, 1);
            INSERT INTO operation (id, name, order_index) VALUES ('OP_ASM', 'Assemble', 20);
            INSERT INTO operation (id, name, order_index, is_final) VALUES ('OP_PACK', 'Pack', 40, 1);
            INSERT INTO part_number (id, part_number, product_code, serial_mask, serial_gen_type)
            VALUES ('P1', '100-200', 'MODEL-X', '###', 'LOT_BASED');
            "#,
        )
        .unwrap();
        for (order, sap) in [("KA001", "SAP1"), ("KA002", "SAP2")] {
            conn.execute(
                "INSERT INTO work_order (id, order_number, sap_order_number, part_number_id, quantity, status, created_at) VALUES (?1, ?1, ?2, 'P1', ?3, 'OPEN', '2025-01-01 00:00:00.000')",
                params![order, sap, quantity],
            )
            .unwrap();
        }
        SerialRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn request<'a>(tray: &'a str, order: &'a str, requested: i64) -> TrayBatchRequest<'a> {
        TrayBatchRequest {
            tray_id: tray,
            order_number: order,
            part_number_id: "P1",
            operation_id: "OP_INIT",
            operator_id: "alice",
            requested,
            tray_capacity: 100,
            auto_complete: false,
        }
    }

    fn serial(order: &'static str) -> impl Fn(i64) -> Result<String, String> {
        move |seq| Ok(format!("{}-{:03}M", order, seq))
    }

    #[test]
    fn test_generate_caps_by_remaining_quantity() {
        let repo = setup(5);
        let out = repo
            .generate_tray_batch(&request("T1", "KA001", 100), serial("KA001"))
            .unwrap();
        match out {
            TrayBatchOutcome::Generated { serial_numbers, .. } => {
                assert_eq!(serial_numbers.len(), 5);
                assert_eq!(serial_numbers[0], "KA001-001M");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let again = repo
            .generate_tray_batch(&request("T2", "KA001", 10), serial("KA001"))
            .unwrap();
        assert_eq!(
            again,
            TrayBatchOutcome::OrderFull {
                quantity: 5,
                assigned: 5
            }
        );
    }

    #[test]
    fn test_generate_rejects_tray_held_by_other_order() {
        let repo = setup(10);
        repo.generate_tray_batch(&request("T1", "KA001", 3), serial("KA001"))
            .unwrap();
        let out = repo
            .generate_tray_batch(&request("T1", "KA002", 3), serial("KA002"))
            .unwrap();
        assert_eq!(
            out,
            TrayBatchOutcome::TrayOccupied {
                blocking_order: "KA001".to_string()
            }
        );
        assert!(repo.list_by_order("KA002").unwrap().is_empty());
    }

    #[test]
    fn test_serial_overflow_rolls_back() {
        let repo = setup(10);
        let err = repo
            .generate_tray_batch(&request("T1", "KA001", 5), |seq| {
                if seq > 2 {
                    Err("overflow".to_string())
                } else {
                    Ok(format!("S{}", seq))
                }
            })
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
        assert!(repo.list_by_tray("T1").unwrap().is_empty());
    }

    #[test]
    fn test_mark_all_skips_units_already_at_station() {
        let repo = setup(10);
        repo.generate_tray_batch(&request("T1", "KA001", 3), serial("KA001"))
            .unwrap();
        let serials: Vec<String> = repo
            .list_by_tray("T1")
            .unwrap()
            .into_iter()
            .map(|u| u.serial_number)
            .collect();

        let first = repo.advance_unit(&serials[0], "OP_ASM", "bob", false).unwrap();
        assert_eq!(first, AdvanceOutcome::Advanced { order_closed: false });

        let marked = repo.mark_all(&serials, "OP_ASM", "bob").unwrap();
        assert_eq!(marked, serials[1..].to_vec());

        let history = repo.history(&serials[0]).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].recorded_at <= history[1].recorded_at);
    }

    #[test]
    fn test_finalize_closes_order_when_quantity_reached() {
        let repo = setup(2);
        repo.generate_tray_batch(&request("T1", "KA001", 2), serial("KA001"))
            .unwrap();
        let serials: Vec<String> = repo
            .list_by_tray("T1")
            .unwrap()
            .into_iter()
            .map(|u| u.serial_number)
            .collect();

        let out = repo.finalize(&serials, "OP_PACK", "carol").unwrap();
        assert_eq!(out.finalized.len(), 2);
        assert_eq!(out.closed_orders, vec!["KA001".to_string()]);
        assert!(repo.find(&serials[0]).unwrap().unwrap().is_complete);

        // 不可逆: 再次完工无变化
        assert_eq!(repo.finalize(&serials, "OP_PACK", "carol").unwrap(), FinalizeOutcome::default());
        assert_eq!(
            repo.advance_unit(&serials[0], "OP_ASM", "bob", false).unwrap(),
            AdvanceOutcome::AlreadyComplete
        );
    }
}

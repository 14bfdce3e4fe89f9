// ==========================================
// 产线追溯系统 - 工单仓储
// ==========================================
// 表: work_order
// 红线: 批次号在写事务内分配，保证唯一且递增
// 红线: 状态只允许 OPEN → CLOSED
// ==========================================

use crate::domain::order::WorkOrder;
use crate::domain::types::OrderStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{format_ts, now_ts, parse_ts};
use rusqlite::{
    params, Connection, OptionalExtension, Result as SqliteResult, Row, TransactionBehavior,
};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// OrderRepository - 工单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
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

    /// 创建工单并分配批次号
    ///
    /// # 参数
    /// - `sap_order_number`: SAP 工单号
    /// - `part_number_id`: 物料ID
    /// - `quantity`: 工单数量
    /// - `lot_prefix`: 批次号前缀（年份码 + 季度码）
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: SAP 工单号已被未关闭工单占用
    pub fn create_with_lot_number(
        &self,
        sap_order_number: &str,
        part_number_id: &str,
        quantity: i64,
        lot_prefix: &str,
    ) -> RepositoryResult<WorkOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let duplicate: Option<String> = tx
            .query_row(
                "SELECT order_number FROM work_order WHERE sap_order_number = ?1 AND status <> 'CLOSED' LIMIT 1",
                params![sap_order_number],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = duplicate {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "SAP 工单号 {} 已存在未关闭工单 {}",
                sap_order_number, existing
            )));
        }

        // 取同前缀的最大流水号 + 1
        let max_seq: Option<i64> = tx.query_row(
            r#"
            SELECT MAX(CAST(substr(order_number, length(?1) + 1) AS INTEGER))
            FROM work_order
            WHERE order_number GLOB ?1 || '[0-9]*'
            "#,
            params![lot_prefix],
            |row| row.get(0),
        )?;
        let order_number = format!("{}{:03}", lot_prefix, max_seq.unwrap_or(0) + 1);

        let order = WorkOrder {
            id: uuid::Uuid::new_v4().to_string(),
            order_number,
            sap_order_number: sap_order_number.to_string(),
            part_number_id: part_number_id.to_string(),
            quantity,
            status: OrderStatus::Open,
            created_at: now_ts(),
        };

        tx.execute(
            r#"
            INSERT INTO work_order (id, order_number, sap_order_number, part_number_id, quantity, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                order.id,
                order.order_number,
                order.sap_order_number,
                order.part_number_id,
                order.quantity,
                order.status.to_db_str(),
                format_ts(&order.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(order)
    }

    /// 修改工单数量
    ///
    /// # 返回
    /// - `Err(ValidationError)`: 工单已关闭，或新数量小于已分配数量
    pub fn update_quantity(&self, order_number: &str, quantity: i64) -> RepositoryResult<WorkOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let order = Self::find_with(&tx, order_number)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: order_number.to_string(),
        })?;
        if !order.is_open() {
            return Err(RepositoryError::ValidationError(format!(
                "工单 {} 已关闭，不能修改数量",
                order_number
            )));
        }

        let assigned = Self::count_assigned_with(&tx, order_number)?;
        if quantity < assigned {
            return Err(RepositoryError::ValidationError(format!(
                "工单 {} 数量 {} 小于已分配序列号数量 {}",
                order_number, quantity, assigned
            )));
        }

        tx.execute(
            "UPDATE work_order SET quantity = ?1 WHERE order_number = ?2",
            params![quantity, order_number],
        )?;
        tx.commit()?;

        Ok(WorkOrder { quantity, ..order })
    }

    /// 关闭工单（仅 OPEN → CLOSED）
    ///
    /// # 返回
    /// - `Ok(true)`: 本次关闭
    /// - `Ok(false)`: 工单已是关闭状态
    pub fn close(&self, order_number: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE work_order SET status = 'CLOSED' WHERE order_number = ?1 AND status = 'OPEN'",
            params![order_number],
        )?;
        if rows == 0 && Self::find_with(&conn, order_number)?.is_none() {
            return Err(RepositoryError::NotFound {
                entity: "WorkOrder".to_string(),
                id: order_number.to_string(),
            });
        }
        Ok(rows > 0)
    }

    /// 删除工单（存在序列号时失败）
    pub fn delete(&self, order_number: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let assigned = Self::count_assigned_with(&tx, order_number)?;
        if assigned > 0 {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "工单 {} 已有 {} 个序列号，不能删除",
                order_number, assigned
            )));
        }

        let rows = tx.execute(
            "DELETE FROM work_order WHERE order_number = ?1",
            params![order_number],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "WorkOrder".to_string(),
                id: order_number.to_string(),
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// 满足完工条件时关闭工单（在调用方事务内执行）
    ///
    /// 完工条件: 最后一条历史停留在最终工序的序列号数量 ≥ 工单数量
    ///
    /// # 返回
    /// - `Ok(true)`: 本次关闭
    pub(crate) fn close_if_complete_with(
        conn: &Connection,
        order_number: &str,
        final_operation_id: &str,
    ) -> SqliteResult<bool> {
        let completed = Self::completed_at_station_with(conn, order_number, final_operation_id)?;
        let rows = conn.execute(
            "UPDATE work_order SET status = 'CLOSED' WHERE order_number = ?1 AND status = 'OPEN' AND quantity <= ?2",
            params![order_number, completed],
        )?;
        Ok(rows > 0)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_order_number(&self, order_number: &str) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        Ok(Self::find_with(&conn, order_number)?)
    }

    fn find_with(conn: &Connection, order_number: &str) -> SqliteResult<Option<WorkOrder>> {
        conn.query_row(
            &format!("{} WHERE order_number = ?1", ORDER_SELECT),
            params![order_number],
            map_order_row,
        )
        .optional()
    }

    /// 按 SAP 工单号查询未关闭工单
    pub fn find_open_by_sap(&self, sap_order_number: &str) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE sap_order_number = ?1 AND status = 'OPEN' ORDER BY order_number",
            ORDER_SELECT
        ))?;
        let orders = stmt
            .query_map(params![sap_order_number], map_order_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(orders)
    }

    /// 工单列表（可按状态过滤）
    pub fn list(&self, status: Option<OrderStatus>) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let orders = match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status = ?1 ORDER BY created_at DESC, order_number DESC",
                    ORDER_SELECT
                ))?;
                let rows = stmt
                    .query_map(params![s.to_db_str()], map_order_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY created_at DESC, order_number DESC",
                    ORDER_SELECT
                ))?;
                let rows = stmt
                    .query_map([], map_order_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };
        Ok(orders)
    }

    /// 工单已分配的序列号数量
    pub fn count_assigned(&self, order_number: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(Self::count_assigned_with(&conn, order_number)?)
    }

    pub(crate) fn count_assigned_with(conn: &Connection, order_number: &str) -> SqliteResult<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM serial_unit WHERE order_number = ?1",
            params![order_number],
            |row| row.get(0),
        )
    }

    /// 最后一条历史停留在指定工序的序列号数量
    pub fn completed_at_station(
        &self,
        order_number: &str,
        operation_id: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(Self::completed_at_station_with(&conn, order_number, operation_id)?)
    }

    fn completed_at_station_with(
        conn: &Connection,
        order_number: &str,
        operation_id: &str,
    ) -> SqliteResult<i64> {
        conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM serial_unit su
            WHERE su.order_number = ?1
              AND (
                SELECT h.operation_id FROM serial_history h
                WHERE h.serial_number = su.serial_number
                ORDER BY h.id DESC
                LIMIT 1
              ) = ?2
            "#,
            params![order_number, operation_id],
            |row| row.get(0),
        )
    }
}

const ORDER_SELECT: &str = r#"
    SELECT id, order_number, sap_order_number, part_number_id, quantity, status, created_at
    FROM work_order
"#;

fn map_order_row(row: &Row) -> SqliteResult<WorkOrder> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(WorkOrder {
        id: row.get(0)?,
        order_number: row.get(1)?,
        sap_order_number: row.get(2)?,
        part_number_id: row.get(3)?,
        quantity: row.get(4)?,
        status: OrderStatus::from_str(&status),
        created_at: parse_ts(6, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn setup() -> (Arc<Mutex<Connection>>, OrderRepository) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO operation (id, name, order_index, is_initial) VALUES ('OP_INIT', 'Initial', 10, 1);
            INSERT INTO part_number (id, part_number, product_code, serial_mask, serial_gen_type)
            VALUES ('P1', '100-200', 'MODEL-X', '####', 'LOT_BASED');
            "#,
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = OrderRepository::new(conn.clone());
        (conn, repo)
    }

    #[test]
    fn test_lot_numbers_increase_within_prefix() {
        let (_conn, repo) = setup();
        let a = repo.create_with_lot_number("SAP1", "P1", 10, "KA").unwrap();
        let b = repo.create_with_lot_number("SAP2", "P1", 10, "KA").unwrap();
        let c = repo.create_with_lot_number("SAP3", "P1", 10, "KB").unwrap();

        assert_eq!(a.order_number, "KA001");
        assert_eq!(b.order_number, "KA002");
        assert_eq!(c.order_number, "KB001");
    }

    #[test]
    fn test_duplicate_sap_only_among_open_orders() {
        let (_conn, repo) = setup();
        let a = repo.create_with_lot_number("SAP1", "P1", 10, "KA").unwrap();
        assert!(matches!(
            repo.create_with_lot_number("SAP1", "P1", 10, "KA"),
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));

        assert!(repo.close(&a.order_number).unwrap());
        assert!(!repo.close(&a.order_number).unwrap());
        assert!(repo.create_with_lot_number("SAP1", "P1", 10, "KA").is_ok());
    }

    #[test]
    fn test_update_quantity_rules() {
        let (conn, repo) = setup();
        let order = repo.create_with_lot_number("SAP1", "P1", 10, "KA").unwrap();
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO serial_unit (serial_number, order_number, part_number_id, current_operation_id) VALUES ('S1', ?1, 'P1', 'OP_INIT')",
                params![order.order_number],
            )
            .unwrap();

        assert!(matches!(
            repo.update_quantity(&order.order_number, 0),
            Err(RepositoryError::ValidationError(_))
        ));
        assert_eq!(repo.update_quantity(&order.order_number, 5).unwrap().quantity, 5);
        assert!(matches!(
            repo.delete(&order.order_number),
            Err(RepositoryError::ForeignKeyViolation(_))
        ));
    }
}

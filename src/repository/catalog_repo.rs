// ==========================================
// 产线追溯系统 - 主数据（目录）仓储
// ==========================================
// 表: operation / process_route / process_route_step / part_number
// 红线: 路线与步骤在同一事务内整体替换
// ==========================================

use crate::domain::catalog::{Operation, PartNumber, ProcessRoute, RouteStep};
use crate::domain::types::SerialGenType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// CatalogRepository - 目录仓储
// ==========================================
pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 工序 Operation
    // ==========================================

    /// 新增或更新工序
    pub fn upsert_operation(&self, op: &Operation) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO operation (id, name, order_index, is_initial, is_final, require_test_log)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                order_index = excluded.order_index,
                is_initial = excluded.is_initial,
                is_final = excluded.is_final,
                require_test_log = excluded.require_test_log
            "#,
            params![
                op.id,
                op.name,
                op.order_index,
                op.is_initial as i32,
                op.is_final as i32,
                op.require_test_log as i32,
            ],
        )?;
        Ok(())
    }

    /// 查询全部工序（附带当前工位锁持有人）
    pub fn list_operations(&self) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;
        Self::list_operations_with(&conn)
    }

    fn list_operations_with(conn: &Connection) -> RepositoryResult<Vec<Operation>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT o.id, o.name, o.order_index, o.is_initial, o.is_final, o.require_test_log,
                   l.owner_id
            FROM operation o
            LEFT JOIN station_lock l ON l.operation_id = o.id
            ORDER BY o.order_index, o.id
            "#,
        )?;
        let ops = stmt
            .query_map([], map_operation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ops)
    }

    pub fn find_operation(&self, operation_id: &str) -> RepositoryResult<Option<Operation>> {
        let conn = self.get_conn()?;
        let op = conn
            .query_row(
                r#"
                SELECT o.id, o.name, o.order_index, o.is_initial, o.is_final, o.require_test_log,
                       l.owner_id
                FROM operation o
                LEFT JOIN station_lock l ON l.operation_id = o.id
                WHERE o.id = ?1
                "#,
                params![operation_id],
                map_operation_row,
            )
            .optional()?;
        Ok(op)
    }

    // ==========================================
    // 工艺路线 ProcessRoute
    // ==========================================

    /// 保存工艺路线（路线 + 步骤整体替换）
    ///
    /// # 返回
    /// - `Err(ValidationError)`: 违反路线不变量（重复工序 / 缺少初始工序 / 工序不存在）
    pub fn save_route(&self, route: &ProcessRoute) -> RepositoryResult<()> {
        let mut route = route.clone();
        route.sort_steps();

        let mut conn = self.get_conn()?;
        let operations = Self::list_operations_with(&conn)?;
        route
            .validate(&operations)
            .map_err(RepositoryError::ValidationError)?;

        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO process_route (id, name, description) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, description = excluded.description
            "#,
            params![route.id, route.name, route.description],
        )?;
        tx.execute(
            "DELETE FROM process_route_step WHERE process_route_id = ?1",
            params![route.id],
        )?;
        for step in &route.steps {
            tx.execute(
                "INSERT INTO process_route_step (process_route_id, operation_id, step_order) VALUES (?1, ?2, ?3)",
                params![route.id, step.operation_id, step.step_order],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 查询工艺路线（步骤按步序升序）
    pub fn find_route(&self, route_id: &str) -> RepositoryResult<Option<ProcessRoute>> {
        let conn = self.get_conn()?;
        let header = conn
            .query_row(
                "SELECT id, name, description FROM process_route WHERE id = ?1",
                params![route_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, description)) = header else {
            return Ok(None);
        };

        let steps = Self::load_steps(&conn, &id)?;
        Ok(Some(ProcessRoute {
            id,
            name,
            description,
            steps,
        }))
    }

    pub fn list_routes(&self) -> RepositoryResult<Vec<ProcessRoute>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, name, description FROM process_route ORDER BY id")?;
        let headers = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut routes = Vec::with_capacity(headers.len());
        for (id, name, description) in headers {
            let steps = Self::load_steps(&conn, &id)?;
            routes.push(ProcessRoute {
                id,
                name,
                description,
                steps,
            });
        }
        Ok(routes)
    }

    fn load_steps(conn: &Connection, route_id: &str) -> RepositoryResult<Vec<RouteStep>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT operation_id, step_order FROM process_route_step
            WHERE process_route_id = ?1
            ORDER BY step_order
            "#,
        )?;
        let steps = stmt
            .query_map(params![route_id], |row| {
                Ok(RouteStep {
                    operation_id: row.get(0)?,
                    step_order: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(steps)
    }

    /// 删除工艺路线（关联物料解绑，步骤级联删除）
    ///
    /// # 返回
    /// - `Ok(unlinked_parts)`: 被解绑的物料数量
    pub fn delete_route(&self, route_id: &str) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let unlinked = tx.execute(
            "UPDATE part_number SET process_route_id = NULL WHERE process_route_id = ?1",
            params![route_id],
        )?;
        let deleted = tx.execute("DELETE FROM process_route WHERE id = ?1", params![route_id])?;
        if deleted == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProcessRoute".to_string(),
                id: route_id.to_string(),
            });
        }

        tx.commit()?;
        Ok(unlinked)
    }

    // ==========================================
    // 物料 PartNumber
    // ==========================================

    pub fn upsert_part(&self, part: &PartNumber) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO part_number (
                id, part_number, revision, description, product_code,
                serial_mask, serial_gen_type, process_route_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                part_number = excluded.part_number,
                revision = excluded.revision,
                description = excluded.description,
                product_code = excluded.product_code,
                serial_mask = excluded.serial_mask,
                serial_gen_type = excluded.serial_gen_type,
                process_route_id = excluded.process_route_id
            "#,
            params![
                part.id,
                part.part_number,
                part.revision,
                part.description,
                part.product_code,
                part.serial_mask,
                part.serial_gen_type.to_db_str(),
                part.process_route_id,
            ],
        )?;
        Ok(())
    }

    pub fn find_part(&self, part_id: &str) -> RepositoryResult<Option<PartNumber>> {
        let conn = self.get_conn()?;
        let part = conn
            .query_row(
                &format!("{} WHERE id = ?1", PART_SELECT),
                params![part_id],
                map_part_row,
            )
            .optional()?;
        Ok(part)
    }

    /// 按型号代码查询（同一型号可对应多个料号）
    pub fn find_parts_by_product_code(&self, product_code: &str) -> RepositoryResult<Vec<PartNumber>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE product_code = ?1 ORDER BY id", PART_SELECT))?;
        let parts = stmt
            .query_map(params![product_code], map_part_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(parts)
    }

    pub fn list_parts(&self) -> RepositoryResult<Vec<PartNumber>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", PART_SELECT))?;
        let parts = stmt
            .query_map([], map_part_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(parts)
    }
}

const PART_SELECT: &str = r#"
    SELECT id, part_number, revision, description, product_code,
           serial_mask, serial_gen_type, process_route_id
    FROM part_number
"#;

fn map_operation_row(row: &Row) -> SqliteResult<Operation> {
    Ok(Operation {
        id: row.get(0)?,
        name: row.get(1)?,
        order_index: row.get(2)?,
        is_initial: row.get::<_, i32>(3)? != 0,
        is_final: row.get::<_, i32>(4)? != 0,
        require_test_log: row.get::<_, i32>(5)? != 0,
        active_operator_id: row.get(6)?,
    })
}

fn map_part_row(row: &Row) -> SqliteResult<PartNumber> {
    let gen_type: String = row.get(6)?;
    Ok(PartNumber {
        id: row.get(0)?,
        part_number: row.get(1)?,
        revision: row.get(2)?,
        description: row.get(3)?,
        product_code: row.get(4)?,
        serial_mask: row.get(5)?,
        serial_gen_type: SerialGenType::from_str(&gen_type),
        process_route_id: row.get(7)?,
    })
}

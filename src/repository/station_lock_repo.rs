// ==========================================
// 产线追溯系统 - 工位锁仓储
// ==========================================
// 表: station_lock（无行 = FREE）
// 红线: 加锁是按持有人条件更新的单条语句（CAS），不做先查后写
// ==========================================

use crate::domain::station::StationLock;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{format_ts, now_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct StationLockRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StationLockRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 尝试占用工位
    ///
    /// FREE → HELD(owner)；HELD(owner) → HELD(owner)；HELD(其他人) 时不修改。
    ///
    /// # 返回
    /// - `Ok(true)`: 当前由 owner 持有
    /// - `Ok(false)`: 被其他人持有
    pub fn try_acquire(&self, operation_id: &str, owner_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            INSERT INTO station_lock (operation_id, owner_id, acquired_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(operation_id) DO UPDATE SET owner_id = excluded.owner_id
            WHERE station_lock.owner_id = excluded.owner_id
            "#,
            params![operation_id, owner_id, format_ts(&now_ts())],
        )?;
        Ok(rows > 0)
    }

    /// 释放工位（仅持有人本人）
    ///
    /// # 返回
    /// - `Ok(true)`: 已释放
    /// - `Ok(false)`: 不是持有人或工位空闲，无变化
    pub fn release(&self, operation_id: &str, owner_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM station_lock WHERE operation_id = ?1 AND owner_id = ?2",
            params![operation_id, owner_id],
        )?;
        Ok(rows > 0)
    }

    /// 强制释放工位（主管操作）
    ///
    /// # 返回
    /// 被释放前的锁（工位原本空闲时为 None）
    pub fn force_release(&self, operation_id: &str) -> RepositoryResult<Option<StationLock>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let previous = tx
            .query_row(
                "SELECT operation_id, owner_id, acquired_at FROM station_lock WHERE operation_id = ?1",
                params![operation_id],
                map_lock_row,
            )
            .optional()?;
        tx.execute(
            "DELETE FROM station_lock WHERE operation_id = ?1",
            params![operation_id],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    pub fn find(&self, operation_id: &str) -> RepositoryResult<Option<StationLock>> {
        let conn = self.get_conn()?;
        let lock = conn
            .query_row(
                "SELECT operation_id, owner_id, acquired_at FROM station_lock WHERE operation_id = ?1",
                params![operation_id],
                map_lock_row,
            )
            .optional()?;
        Ok(lock)
    }

    pub fn list(&self) -> RepositoryResult<Vec<StationLock>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT operation_id, owner_id, acquired_at FROM station_lock ORDER BY operation_id",
        )?;
        let locks = stmt
            .query_map([], map_lock_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(locks)
    }
}

fn map_lock_row(row: &Row) -> SqliteResult<StationLock> {
    let acquired_at: String = row.get(2)?;
    Ok(StationLock {
        operation_id: row.get(0)?,
        owner_id: row.get(1)?,
        acquired_at: parse_ts(2, &acquired_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn repo() -> StationLockRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO operation (id, name, order_index) VALUES ('OP_ASM', 'Assemble', 20)",
            [],
        )
        .unwrap();
        StationLockRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_cas_keeps_first_owner() {
        let repo = repo();
        assert!(repo.try_acquire("OP_ASM", "alice").unwrap());
        assert!(repo.try_acquire("OP_ASM", "alice").unwrap());
        assert!(!repo.try_acquire("OP_ASM", "bob").unwrap());

        assert!(!repo.release("OP_ASM", "bob").unwrap());
        assert_eq!(repo.find("OP_ASM").unwrap().unwrap().owner_id, "alice");

        assert!(repo.release("OP_ASM", "alice").unwrap());
        assert!(repo.find("OP_ASM").unwrap().is_none());
    }

    #[test]
    fn test_reentry_keeps_original_acquired_time() {
        let repo = repo();
        repo.try_acquire("OP_ASM", "alice").unwrap();
        let first = repo.find("OP_ASM").unwrap().unwrap().acquired_at;
        repo.try_acquire("OP_ASM", "alice").unwrap();
        assert_eq!(repo.find("OP_ASM").unwrap().unwrap().acquired_at, first);
    }

    #[test]
    fn test_force_release_returns_previous_holder() {
        let repo = repo();
        repo.try_acquire("OP_ASM", "alice").unwrap();
        let prev = repo.force_release("OP_ASM").unwrap().unwrap();
        assert_eq!(prev.owner_id, "alice");
        assert!(repo.force_release("OP_ASM").unwrap().is_none());
    }

    #[test]
    fn test_unknown_operation_violates_foreign_key() {
        let repo = repo();
        assert!(matches!(
            repo.try_acquire("OP_NOPE", "alice"),
            Err(RepositoryError::ForeignKeyViolation(_))
        ));
    }
}

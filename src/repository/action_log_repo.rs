// ==========================================
// 产线追溯系统 - 操作日志数据仓储
// ==========================================
// 表: action_log
// 红线: 只追加，不修改
// ==========================================

use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{format_ts, parse_ts};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str =
    "SELECT action_id, action_type, action_ts, actor, target_id, payload_json, detail FROM action_log";

pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条操作日志，返回 action_id
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO action_log (
                action_id, action_type, action_ts, actor, target_id, payload_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.action_id,
                log.action_type,
                format_ts(&log.action_ts),
                log.actor,
                log.target_id,
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;
        Ok(log.action_id.clone())
    }

    /// 按操作对象查询（工单号 / 工序ID / 路线ID / 配置键），最新在前
    pub fn find_by_target(&self, target_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE target_id = ?1 ORDER BY action_ts DESC, rowid DESC",
            SELECT_COLUMNS
        ))?;
        let logs = stmt
            .query_map(params![target_id], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// 最近的操作日志
    pub fn find_recent(&self, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY action_ts DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let logs = stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<ActionLog> {
    let raw_ts: String = row.get(2)?;
    let payload: Option<String> = row.get(5)?;
    Ok(ActionLog {
        action_id: row.get(0)?,
        action_type: row.get(1)?,
        action_ts: parse_ts(2, &raw_ts)?,
        actor: row.get(3)?,
        target_id: row.get(4)?,
        // 损坏的 payload 不影响日志本身可读
        payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
        detail: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::action_log::ActionType;
    use serde_json::json;

    fn repo() -> ActionLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ActionLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_force_unlock_entry_keeps_payload() {
        let repo = repo();
        let log = ActionLog::new(ActionType::ForceUnlock, "supervisor", Some("OP_ASM"))
            .with_payload(json!({ "previous_owner": "alice", "reason": "交班" }))
            .with_detail("强制解锁");
        assert_eq!(repo.insert(&log).unwrap(), log.action_id);

        let found = repo.find_by_target("OP_ASM").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            ActionType::from_str(&found[0].action_type),
            Some(ActionType::ForceUnlock)
        );
        assert_eq!(found[0].payload_json.as_ref().unwrap()["previous_owner"], "alice");
        assert!(repo.find_by_target("OP_PACK").unwrap().is_empty());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let repo = repo();
        for order in ["KA001", "KA002", "KA003"] {
            repo.insert(&ActionLog::new(ActionType::CloseOrder, "supervisor", Some(order)))
                .unwrap();
        }
        let recent = repo.find_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].target_id.as_deref(), Some("KA003"));
    }
}

// ==========================================
// 产线追溯系统 - 功能测试记录仓储
// ==========================================
// 表: test_log（由测试台写入，本系统只读取；insert 供导入/测试使用）
// ==========================================

use crate::domain::serial::TestLogRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{format_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct TestLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TestLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, record: &TestLogRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO test_log (serial_number, recorded_at, firmware, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.serial_number,
                format_ts(&record.recorded_at),
                record.firmware,
                record.status,
            ],
        )?;
        Ok(())
    }

    /// 序列号最新的一条测试记录
    pub fn find_latest(&self, serial_number: &str) -> RepositoryResult<Option<TestLogRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                r#"
                SELECT serial_number, recorded_at, firmware, status
                FROM test_log
                WHERE serial_number = ?1
                ORDER BY recorded_at DESC, id DESC
                LIMIT 1
                "#,
                params![serial_number],
                |row| {
                    let recorded_at: String = row.get(1)?;
                    Ok(TestLogRecord {
                        serial_number: row.get(0)?,
                        recorded_at: parse_ts(1, &recorded_at)?,
                        firmware: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use chrono::NaiveDate;

    #[test]
    fn test_find_latest_picks_newest_record() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        let repo = TestLogRepository::new(Arc::new(Mutex::new(conn)));

        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        for (hour, fw) in [(8, "1.0.0"), (9, "1.0.1")] {
            repo.insert(&TestLogRecord {
                serial_number: "PCB0001".to_string(),
                recorded_at: day.and_hms_opt(hour, 0, 0).unwrap(),
                firmware: Some(fw.to_string()),
                status: Some("PASS".to_string()),
            })
            .unwrap();
        }

        let latest = repo.find_latest("PCB0001").unwrap().unwrap();
        assert_eq!(latest.firmware.as_deref(), Some("1.0.1"));
        assert!(repo.find_latest("PCB0002").unwrap().is_none());
    }
}

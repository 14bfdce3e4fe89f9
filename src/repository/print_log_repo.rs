// ==========================================
// 产线追溯系统 - 打印记录仓储
// ==========================================
// 表: print_log（只追加）
// 多件任务按序列号逐行记录，一条多行 INSERT 完成
// ==========================================

use crate::domain::serial::PrintLogEntry;
use crate::domain::types::PrintStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{
    format_ts, now_ts, parse_ts, row_placeholders, MAX_ROWS_PER_STATEMENT,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct PrintLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PrintLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 记录打印结果
    ///
    /// # 参数
    /// - `identifiers`: 每个标识一行（序列号 / 批次号 / 托盘号）
    ///
    /// # 返回
    /// 写入行数
    pub fn record(
        &self,
        identifiers: &[String],
        status: PrintStatus,
        message: &str,
        label_summary: Option<&str>,
        job_id: Option<&str>,
    ) -> RepositoryResult<usize> {
        if identifiers.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let ts = format_ts(&now_ts());

        let mut count = 0;
        for chunk in identifiers.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "INSERT INTO print_log (print_identifier, status, message, label_summary, job_id, recorded_at) VALUES {}",
                row_placeholders(chunk.len(), 6)
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 6);
            for id in chunk {
                values.push(Value::from(id.clone()));
                values.push(Value::from(status.to_db_str().to_string()));
                values.push(Value::from(message.to_string()));
                values.push(label_summary.map(|s| Value::from(s.to_string())).unwrap_or(Value::Null));
                values.push(job_id.map(|s| Value::from(s.to_string())).unwrap_or(Value::Null));
                values.push(Value::from(ts.clone()));
            }
            count += tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 按标识查询打印记录（按时间顺序）
    pub fn find_by_identifier(&self, identifier: &str) -> RepositoryResult<Vec<PrintLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, print_identifier, status, message, label_summary, job_id, recorded_at
            FROM print_log
            WHERE print_identifier = ?1
            ORDER BY id
            "#,
        )?;
        let entries = stmt
            .query_map(params![identifier], map_print_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 按打印任务查询
    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<PrintLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, print_identifier, status, message, label_summary, job_id, recorded_at
            FROM print_log
            WHERE job_id = ?1
            ORDER BY id
            "#,
        )?;
        let entries = stmt
            .query_map(params![job_id], map_print_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }
}

fn map_print_row(row: &Row) -> SqliteResult<PrintLogEntry> {
    let status: String = row.get(2)?;
    let recorded_at: String = row.get(6)?;
    Ok(PrintLogEntry {
        id: row.get(0)?,
        print_identifier: row.get(1)?,
        status: PrintStatus::from_str(&status),
        message: row.get(3)?,
        label_summary: row.get(4)?,
        job_id: row.get(5)?,
        recorded_at: parse_ts(6, &recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    #[test]
    fn test_multi_unit_job_logs_one_row_per_serial() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        let repo = PrintLogRepository::new(Arc::new(Mutex::new(conn)));

        let serials: Vec<String> = (1..=3).map(|i| format!("KA001-00{}M", i)).collect();
        let n = repo
            .record(&serials, PrintStatus::Success, "ok", Some("CARTON1,CARTON2"), Some("job-1"))
            .unwrap();
        assert_eq!(n, 3);

        assert_eq!(repo.find_by_job("job-1").unwrap().len(), 3);
        let one = repo.find_by_identifier("KA001-002M").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].status, PrintStatus::Success);
    }
}

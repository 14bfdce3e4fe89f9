// ==========================================
// 产线追溯系统 - 仓储层 SQL 辅助函数
// ==========================================

use crate::domain::types::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;

/// 单条语句的最大行数（多行 VALUES 插入时分块）
pub const MAX_ROWS_PER_STATEMENT: usize = 100;

/// `IN (...)` 占位符，例如 "?, ?, ?"
pub fn in_placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

/// 多行 VALUES 占位符，例如 "(?, ?), (?, ?)"
pub fn row_placeholders(rows: usize, cols: usize) -> String {
    let row = format!("({})", in_placeholders(cols));
    std::iter::repeat(row.as_str())
        .take(rows)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析时间戳列（兼容无毫秒的旧格式）
pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub fn parse_ts_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

/// 当前本地时间（毫秒精度）
pub fn now_ts() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ==========================================
// 产线追溯系统 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表脚本，避免测试与运行时 schema 漂移
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置（多连接并发写入时等待而不是立即 BUSY）
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
///
/// 表结构与领域实体一一对应：
/// - operation / process_route / process_route_step / part_number: 主数据（目录）
/// - station_lock: 工位锁实体（无行 = 空闲）
/// - work_order / serial_unit / serial_history / print_log: 生产数据
/// - test_log: 功能测试台写入的外部数据
/// - config_kv / action_log: 配置与审计
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let current = read_schema_version(conn)?;
    if current.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 打开连接并确保 schema 存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS operation (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    is_initial INTEGER NOT NULL DEFAULT 0,
    is_final INTEGER NOT NULL DEFAULT 0,
    require_test_log INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS station_lock (
    operation_id TEXT PRIMARY KEY REFERENCES operation(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS process_route (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS process_route_step (
    process_route_id TEXT NOT NULL REFERENCES process_route(id) ON DELETE CASCADE,
    operation_id TEXT NOT NULL REFERENCES operation(id),
    step_order INTEGER NOT NULL,
    PRIMARY KEY (process_route_id, operation_id)
);

CREATE TABLE IF NOT EXISTS part_number (
    id TEXT PRIMARY KEY,
    part_number TEXT NOT NULL,
    revision TEXT,
    description TEXT,
    product_code TEXT NOT NULL,
    serial_mask TEXT NOT NULL,
    serial_gen_type TEXT NOT NULL DEFAULT 'PCB_SERIAL',
    process_route_id TEXT REFERENCES process_route(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS idx_part_number_product_code ON part_number(product_code);

CREATE TABLE IF NOT EXISTS work_order (
    id TEXT PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    sap_order_number TEXT NOT NULL,
    part_number_id TEXT NOT NULL REFERENCES part_number(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    status TEXT NOT NULL CHECK (status IN ('OPEN', 'CLOSED')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_work_order_sap ON work_order(sap_order_number, status);

CREATE TABLE IF NOT EXISTS serial_unit (
    serial_number TEXT PRIMARY KEY,
    order_number TEXT NOT NULL,
    part_number_id TEXT NOT NULL REFERENCES part_number(id),
    current_operation_id TEXT NOT NULL REFERENCES operation(id),
    tray_id TEXT,
    is_complete INTEGER NOT NULL DEFAULT 0,
    test_recorded_at TEXT,
    test_firmware TEXT
);
CREATE INDEX IF NOT EXISTS idx_serial_unit_order ON serial_unit(order_number);
CREATE INDEX IF NOT EXISTS idx_serial_unit_tray ON serial_unit(tray_id, is_complete);

CREATE TABLE IF NOT EXISTS serial_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    serial_number TEXT NOT NULL REFERENCES serial_unit(serial_number),
    operation_id TEXT NOT NULL REFERENCES operation(id),
    operator_id TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_serial_history_serial ON serial_history(serial_number, id);
CREATE INDEX IF NOT EXISTS idx_serial_history_recorded ON serial_history(recorded_at);

CREATE TABLE IF NOT EXISTS print_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    print_identifier TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('SUCCESS', 'ERROR')),
    message TEXT NOT NULL,
    label_summary TEXT,
    job_id TEXT,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_print_log_identifier ON print_log(print_identifier);

CREATE TABLE IF NOT EXISTS test_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    serial_number TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    firmware TEXT,
    status TEXT
);
CREATE INDEX IF NOT EXISTS idx_test_log_serial ON test_log(serial_number, recorded_at);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    target_id TEXT,
    payload_json TEXT,
    detail TEXT
);
CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(action_ts);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}

// ==========================================
// 产线追溯系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::tray::TRAY_HARD_CAP;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// ==========================================
// MesSettings - 运行配置快照
// ==========================================
// 引擎只读取快照，不直接访问 config_kv
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MesSettings {
    /// 托盘容量上限
    pub tray_max_units: i64,
    /// 单个工单数量上限
    pub order_max_quantity: i64,
    /// 批次号年份基准（对应 lot_base_char）
    pub lot_base_year: i32,
    pub lot_base_char: char,
    /// 生成序列号的后缀字母
    pub serial_suffix: char,
    /// 生成序列号主体的最少位数
    pub serial_min_digits: usize,
    /// 工位监控轮询间隔（秒）
    pub monitor_poll_interval_secs: u64,
}

impl Default for MesSettings {
    fn default() -> Self {
        Self {
            tray_max_units: 100,
            order_max_quantity: 100_000,
            lot_base_year: 2025,
            lot_base_char: 'K',
            serial_suffix: 'M',
            serial_min_digits: 3,
            monitor_poll_interval_secs: 5,
        }
    }
}

impl MesSettings {
    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_poll_interval_secs.max(1))
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        validate_value(key, value)?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置
    pub fn get_config_snapshot(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> RepositoryResult<T> {
        let value = self.get_global_config_value(key)?;
        Ok(value
            .and_then(|v| v.trim().parse::<T>().ok())
            .unwrap_or(default))
    }

    fn get_char(&self, key: &str, default: char) -> RepositoryResult<char> {
        let value = self.get_global_config_value(key)?;
        // 只接受单个字母，否则序列号结尾无法剥离
        Ok(value
            .and_then(|v| single_letter(&v))
            .unwrap_or(default))
    }

    // ===== 托盘与工单 =====

    pub fn get_tray_max_units(&self) -> RepositoryResult<i64> {
        let v = self.get_parsed(config_keys::TRAY_MAX_UNITS, TRAY_HARD_CAP)?;
        Ok(v.clamp(1, TRAY_HARD_CAP))
    }

    pub fn get_order_max_quantity(&self) -> RepositoryResult<i64> {
        let v = self.get_parsed(config_keys::ORDER_MAX_QUANTITY, 100_000i64)?;
        Ok(if v > 0 { v } else { 100_000 })
    }

    // ===== 批次号 =====

    pub fn get_lot_base_year(&self) -> RepositoryResult<i32> {
        self.get_parsed(config_keys::LOT_BASE_YEAR, 2025)
    }

    pub fn get_lot_base_char(&self) -> RepositoryResult<char> {
        self.get_char(config_keys::LOT_BASE_CHAR, 'K')
    }

    // ===== 序列号 =====

    pub fn get_serial_suffix(&self) -> RepositoryResult<char> {
        self.get_char(config_keys::SERIAL_SUFFIX, 'M')
    }

    pub fn get_serial_min_digits(&self) -> RepositoryResult<usize> {
        self.get_parsed(config_keys::SERIAL_MIN_DIGITS, 3usize)
    }

    // ===== 监控 =====

    pub fn get_monitor_poll_interval_secs(&self) -> RepositoryResult<u64> {
        self.get_parsed(config_keys::MONITOR_POLL_INTERVAL_SECS, 5u64)
    }

    /// 加载运行配置快照
    pub fn load_settings(&self) -> RepositoryResult<MesSettings> {
        Ok(MesSettings {
            tray_max_units: self.get_tray_max_units()?,
            order_max_quantity: self.get_order_max_quantity()?,
            lot_base_year: self.get_lot_base_year()?,
            lot_base_char: self.get_lot_base_char()?,
            serial_suffix: self.get_serial_suffix()?,
            serial_min_digits: self.get_serial_min_digits()?,
            monitor_poll_interval_secs: self.get_monitor_poll_interval_secs()?,
        })
    }
}

fn single_letter(raw: &str) -> Option<char> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

/// 写入前校验配置值
fn validate_value(key: &str, value: &str) -> RepositoryResult<()> {
    let v = value.trim();
    let valid = match key {
        config_keys::TRAY_MAX_UNITS => v
            .parse::<i64>()
            .map(|n| (1..=TRAY_HARD_CAP).contains(&n))
            .unwrap_or(false),
        config_keys::ORDER_MAX_QUANTITY => v.parse::<i64>().map(|n| n > 0).unwrap_or(false),
        config_keys::LOT_BASE_YEAR => v.parse::<i32>().is_ok(),
        config_keys::LOT_BASE_CHAR | config_keys::SERIAL_SUFFIX => single_letter(v).is_some(),
        config_keys::SERIAL_MIN_DIGITS => v.parse::<usize>().map(|n| n > 0).unwrap_or(false),
        config_keys::MONITOR_POLL_INTERVAL_SECS => v.parse::<u64>().map(|n| n > 0).unwrap_or(false),
        _ => {
            return Err(RepositoryError::ValidationError(format!(
                "未知配置项: {}",
                key
            )))
        }
    };
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::ValidationError(format!(
            "配置项 {} 的值无效: {}",
            key, value
        )))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 托盘
    pub const TRAY_MAX_UNITS: &str = "tray.max_units";

    // 工单
    pub const ORDER_MAX_QUANTITY: &str = "order.max_quantity";

    // 批次号
    pub const LOT_BASE_YEAR: &str = "lot.base_year";
    pub const LOT_BASE_CHAR: &str = "lot.base_char";

    // 序列号
    pub const SERIAL_SUFFIX: &str = "serial.suffix";
    pub const SERIAL_MIN_DIGITS: &str = "serial.min_digits";

    // 工位监控
    pub const MONITOR_POLL_INTERVAL_SECS: &str = "monitor.poll_interval_secs";

    pub const ALL: [&str; 7] = [
        TRAY_MAX_UNITS,
        ORDER_MAX_QUANTITY,
        LOT_BASE_YEAR,
        LOT_BASE_CHAR,
        SERIAL_SUFFIX,
        SERIAL_MIN_DIGITS,
        MONITOR_POLL_INTERVAL_SECS,
    ];
}

// ==========================================
// 产线追溯系统 - 工位领域模型
// ==========================================
// 工位 = 某个工序的运行时上下文，同一时刻最多一个操作员
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// StationLock - 工位锁实体
// ==========================================
// 无行 = FREE；有行 = HELD(owner_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationLock {
    pub operation_id: String,
    pub owner_id: String,
    pub acquired_at: NaiveDateTime,
}

// ==========================================
// StationState - 工位状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationState {
    Free,
    Held { owner_id: String },
}

impl StationState {
    pub fn from_lock(lock: Option<&StationLock>) -> Self {
        match lock {
            Some(l) => StationState::Held {
                owner_id: l.owner_id.clone(),
            },
            None => StationState::Free,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            StationState::Held { owner_id } => Some(owner_id.as_str()),
            StationState::Free => None,
        }
    }
}

// ==========================================
// StationStatus - 工位监控快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStatus {
    pub operation_id: String,
    pub operation_name: String,
    pub owner_id: Option<String>,
    pub acquired_at: Option<NaiveDateTime>,
    /// 当日在本工位登记的过站记录数
    pub processed_today: i64,
}

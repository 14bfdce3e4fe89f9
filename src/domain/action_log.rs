// ==========================================
// 产线追溯系统 - 操作日志领域模型
// ==========================================
// 红线: 主管类操作（强制解锁、关单、改数量、删单、路线维护）必须记录
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
// 对齐: action_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,        // 日志ID (UUID)
    pub action_type: String,      // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime, // 操作时间戳
    pub actor: String,            // 操作人
    pub target_id: Option<String>, // 操作对象（工单号 / 工序ID / 路线ID）

    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateOrder,      // 创建工单
    UpdateQuantity,   // 修改工单数量
    CloseOrder,       // 手动关单
    DeleteOrder,      // 删除工单
    ForceUnlock,      // 强制解锁工位
    SaveRoute,        // 保存工艺路线
    DeleteRoute,      // 删除工艺路线
    UpdateConfig,     // 修改运行配置
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateOrder => "CreateOrder",
            ActionType::UpdateQuantity => "UpdateQuantity",
            ActionType::CloseOrder => "CloseOrder",
            ActionType::DeleteOrder => "DeleteOrder",
            ActionType::ForceUnlock => "ForceUnlock",
            ActionType::SaveRoute => "SaveRoute",
            ActionType::DeleteRoute => "DeleteRoute",
            ActionType::UpdateConfig => "UpdateConfig",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CreateOrder" => Some(ActionType::CreateOrder),
            "UpdateQuantity" => Some(ActionType::UpdateQuantity),
            "CloseOrder" => Some(ActionType::CloseOrder),
            "DeleteOrder" => Some(ActionType::DeleteOrder),
            "ForceUnlock" => Some(ActionType::ForceUnlock),
            "SaveRoute" => Some(ActionType::SaveRoute),
            "DeleteRoute" => Some(ActionType::DeleteRoute),
            "UpdateConfig" => Some(ActionType::UpdateConfig),
            _ => None,
        }
    }
}

impl ActionLog {
    /// 创建新的操作日志
    ///
    /// # 参数
    /// - `action_type`: 操作类型
    /// - `actor`: 操作人
    /// - `target_id`: 操作对象
    pub fn new(action_type: ActionType, actor: &str, target_id: Option<&str>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.to_string(),
            target_id: target_id.map(|s| s.to_string()),
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 产线追溯系统 - 工单领域模型
// ==========================================
// 红线: 状态只允许 OPEN → CLOSED
// 红线: 完工是派生查询，不缓存布尔值
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// WorkOrder - 工单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    /// 内部批次号（生成，唯一）
    pub order_number: String,
    /// SAP 工单号（未关闭工单中唯一）
    pub sap_order_number: String,
    pub part_number_id: String,
    pub quantity: i64,
    pub status: OrderStatus,
    pub created_at: NaiveDateTime,
}

impl WorkOrder {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

// ==========================================
// 工单进度
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationProgress {
    pub operation_id: String,
    pub operation_name: String,
    pub step_order: i32,
    /// 最后一条历史停留在本工序的序列号数量
    pub completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProgress {
    pub order_number: String,
    pub sap_order_number: String,
    pub quantity: i64,
    pub assigned: i64,
    pub status: OrderStatus,
    pub stations: Vec<StationProgress>,
}

impl OrderProgress {
    /// 尚可分配的序列号数量
    pub fn remaining(&self) -> i64 {
        (self.quantity - self.assigned).max(0)
    }
}

// ==========================================
// 产线追溯系统 - 序列号领域模型
// ==========================================
// 红线: 历史记录只追加，时间单调递增
// 红线: is_complete 只能由最终工序置位，且不可回退
// ==========================================

use crate::domain::types::PrintStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// SerialUnit - 生产单件
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialUnit {
    pub serial_number: String,
    pub order_number: String,
    pub part_number_id: String,
    pub current_operation_id: String,
    pub tray_id: Option<String>,
    pub is_complete: bool,

    // ===== 功能测试证据（来自测试台） =====
    pub test_recorded_at: Option<NaiveDateTime>,
    pub test_firmware: Option<String>,
}

// ==========================================
// HistoryEntry - 过站记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub serial_number: String,
    pub operation_id: String,
    pub operator_id: String,
    pub recorded_at: NaiveDateTime,
}

// ==========================================
// PrintLogEntry - 打印记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintLogEntry {
    pub id: i64,
    /// 序列号 / 批次号 / 托盘号
    pub print_identifier: String,
    pub status: PrintStatus,
    pub message: String,
    pub label_summary: Option<String>,
    pub job_id: Option<String>,
    pub recorded_at: NaiveDateTime,
}

// ==========================================
// SerialDetail - 序列号查询结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDetail {
    pub unit: SerialUnit,
    pub history: Vec<HistoryEntry>,
    pub print_history: Vec<PrintLogEntry>,
}

// ==========================================
// TestLogRecord - 测试台记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogRecord {
    pub serial_number: String,
    pub recorded_at: NaiveDateTime,
    pub firmware: Option<String>,
    pub status: Option<String>,
}

/// 新登记的单件（批量插入用）
#[derive(Debug, Clone)]
pub struct NewSerialUnit {
    pub serial_number: String,
    pub order_number: String,
    pub part_number_id: String,
    pub operation_id: String,
    pub tray_id: Option<String>,
    pub is_complete: bool,
    pub operator_id: String,
    pub test_recorded_at: Option<NaiveDateTime>,
    pub test_firmware: Option<String>,
}

// ==========================================
// 产线追溯系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 数据库时间戳格式（毫秒精度，保证同一秒内的历史记录可排序）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ==========================================
// 序列号生成方式 (Serial Generation Type)
// ==========================================
// PCB_SERIAL: 单件扫描（序列号来自板卡），初始站逐件登记
// LOT_BASED: 托盘批量生成序列号
// ACCESSORIES: 一次性生成并直接完工（附件类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialGenType {
    PcbSerial,
    LotBased,
    Accessories,
}

impl fmt::Display for SerialGenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl SerialGenType {
    /// 从字符串解析（未知值按 PCB_SERIAL 处理，与建表默认值一致）
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "LOT_BASED" => SerialGenType::LotBased,
            "ACCESSORIES" => SerialGenType::Accessories,
            _ => SerialGenType::PcbSerial,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SerialGenType::PcbSerial => "PCB_SERIAL",
            SerialGenType::LotBased => "LOT_BASED",
            SerialGenType::Accessories => "ACCESSORIES",
        }
    }

    /// 是否逐件追溯（单件打印）
    pub fn is_serial_tracked(&self) -> bool {
        matches!(self, SerialGenType::PcbSerial)
    }
}

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
// 红线: 只允许 OPEN → CLOSED，不可重新打开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Closed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "CLOSED" => OrderStatus::Closed,
            _ => OrderStatus::Open,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Closed => "CLOSED",
        }
    }
}

// ==========================================
// 工序就绪状态 (Step Readiness)
// ==========================================
// 路由引擎的唯一输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepReadiness {
    /// 已完工或已在本站（及之后）处理过
    Ahead,
    /// 可以在本站处理
    Ready,
    /// 跳过了必经的前序工序
    Pending,
}

impl fmt::Display for StepReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepReadiness::Ahead => write!(f, "AHEAD"),
            StepReadiness::Ready => write!(f, "READY"),
            StepReadiness::Pending => write!(f, "PENDING"),
        }
    }
}

// ==========================================
// 标签类型 (Label Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelType {
    Nameplate,
    Carton1,
    Carton2,
    BoxLabel,
}

impl fmt::Display for LabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelType::Nameplate => write!(f, "NAMEPLATE"),
            LabelType::Carton1 => write!(f, "CARTON1"),
            LabelType::Carton2 => write!(f, "CARTON2"),
            LabelType::BoxLabel => write!(f, "BOX_LABEL"),
        }
    }
}

// ==========================================
// 标签字段数据来源 (Label Data Source)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelDataSource {
    Serial,
    Part,
    Sku,
    Static(String),
}

// ==========================================
// 打印结果状态 (Print Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintStatus {
    Success,
    Error,
}

impl fmt::Display for PrintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PrintStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SUCCESS" => PrintStatus::Success,
            _ => PrintStatus::Error,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PrintStatus::Success => "SUCCESS",
            PrintStatus::Error => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_gen_type_round_trip_and_default() {
        assert_eq!(SerialGenType::from_str("lot_based"), SerialGenType::LotBased);
        assert_eq!(SerialGenType::from_str("ACCESSORIES").to_db_str(), "ACCESSORIES");
        // 历史数据可能为空串，按 PCB_SERIAL 处理
        assert_eq!(SerialGenType::from_str(""), SerialGenType::PcbSerial);
    }

    #[test]
    fn test_readiness_serializes_screaming_case() {
        let json = serde_json::to_string(&StepReadiness::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}

// ==========================================
// 产线追溯系统 - 打印任务领域模型
// ==========================================
// 只描述打印任务本身，不建模打印机作业语言
// ==========================================

use crate::domain::types::{LabelDataSource, LabelType};
use serde::{Deserialize, Serialize};

/// 标签字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintField {
    pub name: String,
    pub source: LabelDataSource,
}

// ==========================================
// PrintJob - 打印任务描述
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub job_id: String,
    /// 序列号 / 批次号 / 托盘号
    pub target_identifier: String,
    pub part_number: String,
    pub sku: String,
    pub fields: Vec<PrintField>,
    pub quantity: i64,
    pub exclude_label_types: Vec<LabelType>,
    /// 多件任务涉及的序列号（单件任务为空）
    pub serial_numbers: Vec<String>,
}

impl PrintJob {
    pub fn new(target_identifier: &str, part_number: &str, sku: &str) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            target_identifier: target_identifier.to_string(),
            part_number: part_number.to_string(),
            sku: sku.to_string(),
            fields: default_fields(),
            quantity: 1,
            exclude_label_types: Vec::new(),
            serial_numbers: Vec::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn excluding(mut self, labels: &[LabelType]) -> Self {
        self.exclude_label_types = labels.to_vec();
        self
    }

    pub fn with_serials(mut self, serials: Vec<String>) -> Self {
        self.serial_numbers = serials;
        self
    }

    /// 实际会输出的标签类型
    pub fn label_types(&self) -> Vec<LabelType> {
        ALL_LABEL_TYPES
            .iter()
            .copied()
            .filter(|t| !self.exclude_label_types.contains(t))
            .collect()
    }

    /// 打印记录中的标签摘要，例如 "CARTON1,CARTON2"
    pub fn label_summary(&self) -> String {
        self.label_types()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub const ALL_LABEL_TYPES: [LabelType; 4] = [
    LabelType::Nameplate,
    LabelType::Carton1,
    LabelType::Carton2,
    LabelType::BoxLabel,
];

fn default_fields() -> Vec<PrintField> {
    vec![
        PrintField {
            name: "SERIAL".to_string(),
            source: LabelDataSource::Serial,
        },
        PrintField {
            name: "PN".to_string(),
            source: LabelDataSource::Part,
        },
        PrintField {
            name: "SKU".to_string(),
            source: LabelDataSource::Sku,
        },
    ]
}

// ==========================================
// PrintStatusReport - 打印结果（降级为提示）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintStatusReport {
    /// 本次操作不需要打印
    NotRequired,
    Printed,
    /// 打印失败，业务操作仍然成功
    Warning(String),
}

impl PrintStatusReport {
    pub fn is_warning(&self) -> bool {
        matches!(self, PrintStatusReport::Warning(_))
    }
}

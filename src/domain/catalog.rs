// ==========================================
// 产线追溯系统 - 主数据（目录）领域模型
// ==========================================
// 包含: 工序 Operation / 工艺路线 ProcessRoute / 物料 PartNumber
// 红线: 路线内每个工序最多出现一次，且至少一步引用初始工序
// ==========================================

use crate::domain::types::SerialGenType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ==========================================
// Operation - 工序（即工位的静态定义）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub name: String,
    pub order_index: i32,
    pub is_initial: bool,
    pub is_final: bool,
    pub require_test_log: bool,
    /// 当前操作员（由 station_lock 派生，读取时填充）
    pub active_operator_id: Option<String>,
}

impl Operation {
    pub fn new(id: &str, name: &str, order_index: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            order_index,
            is_initial: false,
            is_final: false,
            require_test_log: false,
            active_operator_id: None,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn final_step(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn with_test_log(mut self) -> Self {
        self.require_test_log = true;
        self
    }
}

// ==========================================
// RouteStep - 路线步骤
// ==========================================
// step_order 为稀疏值（10, 20, 30 ...）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    pub operation_id: String,
    pub step_order: i32,
}

// ==========================================
// ProcessRoute - 工艺路线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRoute {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// 按 step_order 升序
    pub steps: Vec<RouteStep>,
}

impl ProcessRoute {
    /// 查找工序在路线中的步序
    pub fn step_order_of(&self, operation_id: &str) -> Option<i32> {
        self.steps
            .iter()
            .find(|s| s.operation_id == operation_id)
            .map(|s| s.step_order)
    }

    /// 当前工位的紧前步骤（按步序排序后的前一项）
    pub fn previous_step(&self, operation_id: &str) -> Option<&RouteStep> {
        let idx = self.steps.iter().position(|s| s.operation_id == operation_id)?;
        if idx == 0 {
            None
        } else {
            self.steps.get(idx - 1)
        }
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.step_order_of(operation_id).is_some()
    }

    /// 步骤排序（读取/保存前调用）
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.step_order);
    }

    /// 校验路线不变量
    ///
    /// # 参数
    /// - `operations`: 目录中全部工序（用于判断初始工序）
    ///
    /// # 返回
    /// - `Err(message)`: 违反的规则描述
    pub fn validate(&self, operations: &[Operation]) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err(format!("工艺路线 {} 没有任何步骤", self.id));
        }

        let mut seen_ops = HashSet::new();
        let mut seen_orders = HashSet::new();
        for step in &self.steps {
            if !seen_ops.insert(step.operation_id.as_str()) {
                return Err(format!(
                    "工艺路线 {} 中工序 {} 重复出现",
                    self.id, step.operation_id
                ));
            }
            if step.step_order <= 0 {
                return Err(format!(
                    "工艺路线 {} 的步序必须为正数: {}",
                    self.id, step.step_order
                ));
            }
            if !seen_orders.insert(step.step_order) {
                return Err(format!(
                    "工艺路线 {} 中步序 {} 重复",
                    self.id, step.step_order
                ));
            }
            if !operations.iter().any(|op| op.id == step.operation_id) {
                return Err(format!("工序不存在: {}", step.operation_id));
            }
        }

        let has_initial = self.steps.iter().any(|step| {
            operations
                .iter()
                .any(|op| op.id == step.operation_id && op.is_initial)
        });
        if !has_initial {
            return Err(format!("工艺路线 {} 缺少初始工序", self.id));
        }

        Ok(())
    }
}

// ==========================================
// PartNumber - 物料（型号）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartNumber {
    pub id: String,
    pub part_number: String,
    pub revision: Option<String>,
    pub description: Option<String>,
    /// 扫描时使用的型号代码
    pub product_code: String,
    /// `#` = 数字，其余字符按字面匹配
    pub serial_mask: String,
    pub serial_gen_type: SerialGenType,
    /// 为空表示不可生产
    pub process_route_id: Option<String>,
}

impl PartNumber {
    /// SKU = 料号 + 版本
    pub fn sku(&self) -> String {
        match self.revision.as_deref() {
            Some(rev) if !rev.trim().is_empty() => format!("{}-{}", self.part_number, rev.trim()),
            _ => self.part_number.clone(),
        }
    }
}

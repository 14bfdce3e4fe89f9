// ==========================================
// 产线追溯系统 - 托盘领域模型
// ==========================================

use crate::domain::types::StepReadiness;
use serde::{Deserialize, Serialize};

/// 托盘内单件及其就绪状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrayUnit {
    pub serial_number: String,
    pub current_operation_id: String,
    pub readiness: StepReadiness,
}

// ==========================================
// LoadedTray - 在工位加载的托盘
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedTray {
    pub tray_id: String,
    pub order_number: String,
    pub operation_id: String,
    pub units: Vec<TrayUnit>,
    /// 全部 AHEAD：托盘在本工位已完成，只允许补打
    pub finished: bool,
}

impl LoadedTray {
    pub fn ready_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.readiness == StepReadiness::Ready)
            .count()
    }

    pub fn ready_serials(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|u| u.readiness == StepReadiness::Ready)
            .map(|u| u.serial_number.clone())
            .collect()
    }
}

/// 托盘物理容量上限，配置值不能超过
pub const TRAY_HARD_CAP: i64 = 100;

/// 计算本次托盘生成数量
///
/// # 参数
/// - `tray_capacity`: 托盘容量上限
/// - `requested`: 操作员请求数量
/// - `quantity`: 工单数量
/// - `assigned`: 工单已分配的序列号数量
///
/// # 返回
/// 可能 ≤ 0（工单已满）
pub fn plan_batch_size(tray_capacity: i64, requested: i64, quantity: i64, assigned: i64) -> i64 {
    tray_capacity
        .min(TRAY_HARD_CAP)
        .min(requested)
        .min(quantity - assigned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_batch_size_bounds() {
        assert_eq!(plan_batch_size(100, 150, 250, 0), 100);
        assert_eq!(plan_batch_size(100, 100, 250, 200), 50);
        assert_eq!(plan_batch_size(100, 20, 250, 0), 20);
        assert_eq!(plan_batch_size(100, 100, 250, 250), 0);
        assert!(plan_batch_size(100, 100, 10, 12) < 0);
        // 配置容量超过物理上限时按上限
        assert_eq!(plan_batch_size(500, 300, 900, 0), TRAY_HARD_CAP);
    }
}

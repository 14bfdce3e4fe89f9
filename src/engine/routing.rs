// ==========================================
// 产线追溯系统 - 路由引擎
// ==========================================
// 职责: 判定单件相对当前工位的就绪状态
// 输出: StepReadiness（AHEAD / READY / PENDING）
// 红线: 纯函数，不访问数据库
// 红线: 托盘中任一单件 PENDING 则整盘拒绝，不允许部分放行
// ==========================================

use crate::domain::catalog::{Operation, ProcessRoute};
use crate::domain::serial::SerialUnit;
use crate::domain::tray::TrayUnit;
use crate::domain::types::StepReadiness;
use crate::engine::error::{EngineError, EngineResult};

/// 判定单件在当前工位的就绪状态
///
/// 规则:
/// - 已完工，或当前工序就是本工位 → AHEAD
/// - 单件步序 < 本工位步序:
///   - 单件停在紧前步骤 → READY
///   - 单件步序 < 紧前步骤步序 → PENDING
///   - 其他 → READY
/// - 其他 → AHEAD
///
/// 不在路线中的工序步序按 0 处理。
pub fn classify(unit: &SerialUnit, route: &ProcessRoute, current_operation_id: &str) -> StepReadiness {
    if unit.is_complete || unit.current_operation_id == current_operation_id {
        return StepReadiness::Ahead;
    }

    let unit_step = route.step_order_of(&unit.current_operation_id).unwrap_or(0);
    let station_step = route.step_order_of(current_operation_id).unwrap_or(0);

    if unit_step < station_step {
        match route.previous_step(current_operation_id) {
            Some(prev) if prev.operation_id == unit.current_operation_id => StepReadiness::Ready,
            Some(prev) if unit_step < prev.step_order => StepReadiness::Pending,
            _ => StepReadiness::Ready,
        }
    } else {
        StepReadiness::Ahead
    }
}

/// 批量判定
pub fn classify_units(
    units: &[SerialUnit],
    route: &ProcessRoute,
    current_operation_id: &str,
) -> Vec<TrayUnit> {
    let classified: Vec<TrayUnit> = units
        .iter()
        .map(|u| TrayUnit {
            serial_number: u.serial_number.clone(),
            current_operation_id: u.current_operation_id.clone(),
            readiness: classify(u, route, current_operation_id),
        })
        .collect();

    tracing::debug!(
        station = current_operation_id,
        total = classified.len(),
        pending = classified
            .iter()
            .filter(|u| u.readiness == StepReadiness::Pending)
            .count(),
        "托盘单件判定完成"
    );
    classified
}

/// 存在 PENDING 单件时返回 PendingStep 错误（列出全部阻塞序列号）
pub fn ensure_none_pending(station: &Operation, units: &[TrayUnit]) -> EngineResult<()> {
    let blocking: Vec<String> = units
        .iter()
        .filter(|u| u.readiness == StepReadiness::Pending)
        .map(|u| u.serial_number.clone())
        .collect();

    if blocking.is_empty() {
        Ok(())
    } else {
        Err(EngineError::PendingStep {
            station: station.name.clone(),
            blocking,
        })
    }
}

/// 工位必须属于当前路线
pub fn ensure_station_in_route(route: &ProcessRoute, station: &Operation) -> EngineResult<()> {
    if route.contains(&station.id) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "工位 {} 不在工艺路线 {} 中",
            station.name, route.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::RouteStep;

    fn route() -> ProcessRoute {
        ProcessRoute {
            id: "R".to_string(),
            name: "R".to_string(),
            description: None,
            steps: [("OP_INIT", 10), ("OP_ASM", 20), ("OP_TEST", 30), ("OP_PACK", 40)]
                .iter()
                .map(|(op, o)| RouteStep {
                    operation_id: op.to_string(),
                    step_order: *o,
                })
                .collect(),
        }
    }

    fn unit(at: &str, complete: bool) -> SerialUnit {
        SerialUnit {
            serial_number: format!("S-{}", at),
            order_number: "KA001".to_string(),
            part_number_id: "P1".to_string(),
            current_operation_id: at.to_string(),
            tray_id: Some("T1".to_string()),
            is_complete: complete,
            test_recorded_at: None,
            test_firmware: None,
        }
    }

    #[test]
    fn test_unit_at_previous_step_is_ready() {
        assert_eq!(classify(&unit("OP_ASM", false), &route(), "OP_TEST"), StepReadiness::Ready);
    }

    #[test]
    fn test_unit_skipping_a_step_is_pending() {
        assert_eq!(classify(&unit("OP_INIT", false), &route(), "OP_TEST"), StepReadiness::Pending);
        assert_eq!(classify(&unit("OP_ASM", false), &route(), "OP_PACK"), StepReadiness::Pending);
    }

    #[test]
    fn test_same_station_later_station_or_complete_is_ahead() {
        let r = route();
        assert_eq!(classify(&unit("OP_ASM", false), &r, "OP_ASM"), StepReadiness::Ahead);
        assert_eq!(classify(&unit("OP_PACK", false), &r, "OP_ASM"), StepReadiness::Ahead);
        assert_eq!(classify(&unit("OP_INIT", true), &r, "OP_PACK"), StepReadiness::Ahead);
    }

    #[test]
    fn test_unit_off_route_only_ready_at_first_station() {
        let r = route();
        // 步序按 0 处理: 只在首个工位放行
        assert_eq!(classify(&unit("OP_OTHER", false), &r, "OP_ASM"), StepReadiness::Pending);
        assert_eq!(classify(&unit("OP_OTHER", false), &r, "OP_INIT"), StepReadiness::Ready);
    }

    #[test]
    fn test_tray_with_pending_member_names_it() {
        let r = route();
        let units = vec![unit("OP_TEST", false), unit("OP_ASM", false)];
        let classified = classify_units(&units, &r, "OP_PACK");
        let station = crate::domain::catalog::Operation::new("OP_PACK", "Pack", 40).final_step();

        match ensure_none_pending(&station, &classified) {
            Err(EngineError::PendingStep { station, blocking }) => {
                assert_eq!(station, "Pack");
                assert_eq!(blocking, vec!["S-OP_ASM".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

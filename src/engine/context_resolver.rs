// ==========================================
// 产线追溯系统 - 扫描上下文解析
// ==========================================
// 职责: 把任意扫描值（SAP 工单号 / 托盘号）解析为 OPEN 工单 + 物料
// 策略按顺序尝试，第一个命中者生效
// 红线: 命中的每个物料都必须属于当前工艺路线
// ==========================================

use crate::domain::catalog::PartNumber;
use crate::domain::order::WorkOrder;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::MesRepositories;
use crate::engine::serial_mask::SerialMask;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 解析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub orders: Vec<WorkOrder>,
    pub parts: Vec<PartNumber>,
    /// 命中的策略名
    pub matched_by: String,
}

// ==========================================
// ContextStrategy Trait
// ==========================================
// 实现者: SapOrderStrategy / TrayStrategy
pub trait ContextStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 尝试解析
    ///
    /// # 返回
    /// - `Ok(None)`: 未命中，交给下一个策略
    /// - `Ok(Some(orders))`: 命中的 OPEN 工单（非空）
    fn attempt(&self, repos: &MesRepositories, token: &str) -> EngineResult<Option<Vec<WorkOrder>>>;
}

/// 按 SAP 工单号查 OPEN 工单
pub struct SapOrderStrategy;

impl ContextStrategy for SapOrderStrategy {
    fn name(&self) -> &'static str {
        "SAP_ORDER"
    }

    fn attempt(&self, repos: &MesRepositories, token: &str) -> EngineResult<Option<Vec<WorkOrder>>> {
        let orders = repos.order_repo.find_open_by_sap(token)?;
        Ok(if orders.is_empty() { None } else { Some(orders) })
    }
}

/// 按托盘号: 托盘单件 → 所属工单的 SAP 号 → 共享该 SAP 号的全部 OPEN 工单
pub struct TrayStrategy;

impl ContextStrategy for TrayStrategy {
    fn name(&self) -> &'static str {
        "TRAY"
    }

    fn attempt(&self, repos: &MesRepositories, token: &str) -> EngineResult<Option<Vec<WorkOrder>>> {
        let units = repos.serial_repo.list_by_tray(token)?;
        if units.is_empty() {
            return Ok(None);
        }

        let order_numbers: BTreeSet<String> = units.into_iter().map(|u| u.order_number).collect();
        let mut sap_numbers = BTreeSet::new();
        for order_number in &order_numbers {
            if let Some(order) = repos.order_repo.find_by_order_number(order_number)? {
                sap_numbers.insert(order.sap_order_number);
            }
        }

        let mut orders: Vec<WorkOrder> = Vec::new();
        for sap in &sap_numbers {
            for order in repos.order_repo.find_open_by_sap(sap)? {
                if !orders.iter().any(|o| o.order_number == order.order_number) {
                    orders.push(order);
                }
            }
        }
        Ok(if orders.is_empty() { None } else { Some(orders) })
    }
}

// ==========================================
// ContextResolver
// ==========================================
pub struct ContextResolver {
    repos: MesRepositories,
    strategies: Vec<Box<dyn ContextStrategy>>,
}

impl ContextResolver {
    /// 默认策略顺序: SAP 工单号 → 托盘号
    pub fn new(repos: MesRepositories) -> Self {
        Self::with_strategies(repos, vec![Box::new(SapOrderStrategy), Box::new(TrayStrategy)])
    }

    pub fn with_strategies(repos: MesRepositories, strategies: Vec<Box<dyn ContextStrategy>>) -> Self {
        Self { repos, strategies }
    }

    /// 解析扫描值
    ///
    /// # 返回
    /// - `Err(RouteMismatch)`: 命中的物料不属于当前路线（指出型号）
    /// - `Err(NotFound)`: 全部策略未命中
    pub fn resolve(&self, token: &str, active_route_id: &str) -> EngineResult<ResolvedContext> {
        let token = token.trim();
        if token.is_empty() {
            return Err(EngineError::Validation("扫描值为空".to_string()));
        }

        for strategy in &self.strategies {
            let Some(orders) = strategy.attempt(&self.repos, token)? else {
                continue;
            };
            tracing::debug!(token, strategy = strategy.name(), count = orders.len(), "扫描值已解析");

            let mut parts: Vec<PartNumber> = Vec::new();
            for order in &orders {
                if parts.iter().any(|p| p.id == order.part_number_id) {
                    continue;
                }
                let part = self
                    .repos
                    .catalog_repo
                    .find_part(&order.part_number_id)?
                    .ok_or_else(|| EngineError::not_found("PartNumber", &order.part_number_id))?;
                if part.process_route_id.as_deref() != Some(active_route_id) {
                    return Err(EngineError::RouteMismatch {
                        product_code: part.product_code,
                        route_id: active_route_id.to_string(),
                    });
                }
                parts.push(part);
            }

            return Ok(ResolvedContext {
                orders,
                parts,
                matched_by: strategy.name().to_string(),
            });
        }

        Err(EngineError::not_found("WorkOrder/Tray", token))
    }
}

/// 按掩码匹配找出序列号所属物料（剥离结尾字母后按模式匹配，不按长度）
pub fn match_part_for_serial<'a>(serial: &str, candidates: &'a [PartNumber]) -> Option<&'a PartNumber> {
    candidates.iter().find(|p| {
        SerialMask::parse(&p.serial_mask)
            .map(|mask| mask.matches(serial))
            .unwrap_or(false)
    })
}

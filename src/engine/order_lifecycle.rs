// ==========================================
// 产线追溯系统 - 工单/序列号生命周期引擎
// ==========================================
// 职责: 创建工单、初始/标准/最终工位单件扫描、完工统计、工单管理
// 红线: 过站历史与单件状态在同一事务内更新
// 红线: 完工是派生查询；最终工位每次过站后检查自动关单
// 红线: 打印失败降级为提示
// ==========================================

use crate::config::MesSettings;
use crate::domain::catalog::{Operation, PartNumber, ProcessRoute};
use crate::domain::order::{OrderProgress, StationProgress, WorkOrder};
use crate::domain::print::PrintStatusReport;
use crate::domain::serial::{NewSerialUnit, SerialDetail, SerialUnit};
use crate::domain::types::{OrderStatus, SerialGenType, StepReadiness};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::lot_number::lot_prefix;
use crate::engine::print_dispatch::{label_jobs, PrintService};
use crate::engine::repositories::MesRepositories;
use crate::engine::routing::{classify, ensure_station_in_route};
use crate::engine::serial_mask::{strip_suffix, SerialMask};
use crate::repository::{AdvanceOutcome, RegisterOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// 结果类型
// ==========================================

/// 工单创建结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order: WorkOrder,
    pub part: PartNumber,
    pub print: PrintStatusReport,
}

/// 单件扫描结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub serial_number: String,
    pub order_number: String,
    pub operation_id: String,
    /// 已在本工位处理过，本次未写入
    pub already_processed: bool,
    /// 本次操作使工单自动关闭
    pub order_closed: bool,
    pub print: PrintStatusReport,
}

/// 工单 + 物料 + 工艺路线
#[derive(Debug, Clone)]
pub struct ProductionContext {
    pub order: WorkOrder,
    pub part: PartNumber,
    pub route: ProcessRoute,
}

// ==========================================
// OrderLifecycleEngine
// ==========================================
pub struct OrderLifecycleEngine {
    repos: MesRepositories,
    print: Arc<PrintService>,
    settings: MesSettings,
}

impl OrderLifecycleEngine {
    pub fn new(repos: MesRepositories, print: Arc<PrintService>, settings: MesSettings) -> Self {
        Self {
            repos,
            print,
            settings,
        }
    }

    // ==========================================
    // 工单创建
    // ==========================================

    /// 创建工单
    ///
    /// # 参数
    /// - `sap_order_number`: SAP 工单号（未关闭工单中唯一）
    /// - `product_code`: 扫描的型号
    /// - `quantity`: 工单数量
    /// - `active_route_id`: 当前工位选定的工艺路线
    ///
    /// # 返回
    /// - `Err(RouteMismatch)`: 型号的工艺路线与当前路线不一致
    /// - `Err(Conflict)`: SAP 工单号重复
    #[instrument(skip(self), fields(sap = %sap_order_number, product_code = %product_code))]
    pub fn create_order(
        &self,
        sap_order_number: &str,
        product_code: &str,
        quantity: i64,
        active_route_id: &str,
    ) -> EngineResult<CreatedOrder> {
        let sap_order_number = sap_order_number.trim();
        let product_code = product_code.trim();
        if sap_order_number.is_empty() {
            return Err(EngineError::Validation("SAP 工单号不能为空".to_string()));
        }
        if quantity <= 0 || quantity > self.settings.order_max_quantity {
            return Err(EngineError::Validation(format!(
                "工单数量必须在 1 到 {} 之间: {}",
                self.settings.order_max_quantity, quantity
            )));
        }

        let part = self.resolve_part_for_route(product_code, active_route_id)?;

        let prefix = lot_prefix(chrono::Local::now().date_naive(), &self.settings);
        let order = self.repos.order_repo.create_with_lot_number(
            sap_order_number,
            &part.id,
            quantity,
            &prefix,
        )?;
        tracing::info!(order_number = %order.order_number, quantity, "工单已创建");

        // 附件类整单打印；批次类在创建时不打印
        let print = match part.serial_gen_type {
            SerialGenType::Accessories => self.print.dispatch(label_jobs::order_setup(
                &order.order_number,
                &part,
                quantity,
            )),
            _ => PrintStatusReport::NotRequired,
        };

        Ok(CreatedOrder { order, part, print })
    }

    /// 按型号找出属于当前路线的物料
    fn resolve_part_for_route(&self, product_code: &str, active_route_id: &str) -> EngineResult<PartNumber> {
        let parts = self.repos.catalog_repo.find_parts_by_product_code(product_code)?;
        if parts.is_empty() {
            return Err(EngineError::not_found("PartNumber", product_code));
        }

        if let Some(part) = parts
            .iter()
            .find(|p| p.process_route_id.as_deref() == Some(active_route_id))
        {
            return Ok(part.clone());
        }

        if parts.iter().all(|p| p.process_route_id.is_none()) {
            return Err(EngineError::Validation(format!(
                "型号 {} 未配置工艺路线，不可生产",
                product_code
            )));
        }

        Err(EngineError::RouteMismatch {
            product_code: product_code.to_string(),
            route_id: active_route_id.to_string(),
        })
    }

    // ==========================================
    // 单件扫描
    // ==========================================

    /// 初始工位单件登记
    ///
    /// 序列号匹配掩码（可带一个结尾字母），写入单件与首条历史；
    /// 单件追溯型号打印单件标签。
    #[instrument(skip(self), fields(serial = %serial, order = %order_number, op = %operation_id))]
    pub fn process_initial(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<ScanResult> {
        let ctx = self.load_context(order_number)?;
        let op = self.load_operation(operation_id)?;
        if !op.is_initial {
            return Err(EngineError::Validation(format!("工位 {} 不是初始工位", op.name)));
        }
        ensure_station_in_route(&ctx.route, &op)?;
        ensure_open(&ctx.order)?;

        let assigned = self.repos.order_repo.count_assigned(order_number)?;
        if assigned >= ctx.order.quantity {
            return Err(EngineError::OrderComplete {
                order_number: order_number.to_string(),
            });
        }

        let mask = SerialMask::parse(&ctx.part.serial_mask)?;
        let serial_number = mask.normalize(serial).ok_or_else(|| {
            EngineError::Validation(format!(
                "序列号 {} 与型号 {} 的掩码 {} 不匹配",
                serial.trim(),
                ctx.part.product_code,
                mask.as_str()
            ))
        })?;

        // 功能测试记录门槛
        let mut test_recorded_at = None;
        let mut test_firmware = None;
        if op.require_test_log && ctx.part.serial_gen_type == SerialGenType::PcbSerial {
            let record = self
                .repos
                .test_log_repo
                .find_latest(serial_number)?
                .ok_or_else(|| {
                    EngineError::Validation(format!("序列号 {} 没有功能测试记录", serial_number))
                })?;
            test_recorded_at = Some(record.recorded_at);
            test_firmware = record.firmware;
        }

        let unit = NewSerialUnit {
            serial_number: serial_number.to_string(),
            order_number: order_number.to_string(),
            part_number_id: ctx.part.id.clone(),
            operation_id: op.id.clone(),
            tray_id: None,
            is_complete: false,
            operator_id: operator_id.to_string(),
            test_recorded_at,
            test_firmware,
        };

        match self.repos.serial_repo.register_initial(&unit)? {
            RegisterOutcome::Registered => {}
            RegisterOutcome::AlreadyRegistered { order_number: owner } if owner == order_number => {
                return Err(EngineError::Conflict(format!(
                    "序列号 {} 已在工单 {} 登记",
                    serial_number, owner
                )));
            }
            RegisterOutcome::AlreadyRegistered { order_number: owner } => {
                return Err(EngineError::Conflict(format!(
                    "序列号 {} 已绑定其他工单 {}",
                    serial_number, owner
                )));
            }
            RegisterOutcome::OrderClosed => {
                return Err(EngineError::Conflict(format!("工单 {} 已关闭", order_number)));
            }
            RegisterOutcome::OrderFull { .. } => {
                return Err(EngineError::OrderComplete {
                    order_number: order_number.to_string(),
                });
            }
        }
        tracing::info!("单件已登记");

        let print = if ctx.part.serial_gen_type.is_serial_tracked() {
            self.print
                .dispatch(label_jobs::initial_unit(serial_number, &ctx.part))
        } else {
            PrintStatusReport::NotRequired
        };

        Ok(ScanResult {
            serial_number: serial_number.to_string(),
            order_number: order_number.to_string(),
            operation_id: op.id,
            already_processed: false,
            order_closed: false,
            print,
        })
    }

    /// 标准工位单件过站
    #[instrument(skip(self), fields(serial = %serial, order = %order_number, op = %operation_id))]
    pub fn process_standard(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<ScanResult> {
        self.process_scan(serial, order_number, operation_id, operator_id, false)
    }

    /// 最终工位单件完工（置完工并打印包装标签）
    #[instrument(skip(self), fields(serial = %serial, order = %order_number, op = %operation_id))]
    pub fn process_final(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<ScanResult> {
        self.process_scan(serial, order_number, operation_id, operator_id, true)
    }

    fn process_scan(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
        final_step: bool,
    ) -> EngineResult<ScanResult> {
        let ctx = self.load_context(order_number)?;
        let op = self.load_operation(operation_id)?;
        match (final_step, op.is_final, op.is_initial) {
            (true, false, _) => {
                return Err(EngineError::Validation(format!("工位 {} 不是最终工位", op.name)));
            }
            (false, true, _) | (false, _, true) => {
                return Err(EngineError::Validation(format!("工位 {} 不是标准工位", op.name)));
            }
            _ => {}
        }
        ensure_station_in_route(&ctx.route, &op)?;

        let unit = self.find_scanned_unit(serial)?;
        if unit.order_number != order_number {
            return Err(EngineError::Validation(format!(
                "序列号 {} 属于工单 {}，不属于 {}",
                unit.serial_number, unit.order_number, order_number
            )));
        }
        if unit.is_complete {
            return Err(EngineError::Validation(format!(
                "序列号 {} 已完工",
                unit.serial_number
            )));
        }
        ensure_open(&ctx.order)?;

        let readiness = classify(&unit, &ctx.route, &op.id);
        tracing::debug!(readiness = %readiness, "单件判定");
        match readiness {
            StepReadiness::Pending => {
                return Err(EngineError::PendingStep {
                    station: op.name.clone(),
                    blocking: vec![unit.serial_number.clone()],
                });
            }
            StepReadiness::Ahead => {
                return Ok(ScanResult {
                    serial_number: unit.serial_number,
                    order_number: order_number.to_string(),
                    operation_id: op.id,
                    already_processed: true,
                    order_closed: false,
                    print: PrintStatusReport::NotRequired,
                });
            }
            StepReadiness::Ready => {}
        }

        let outcome =
            self.repos
                .serial_repo
                .advance_unit(&unit.serial_number, &op.id, operator_id, final_step)?;

        let (already_processed, order_closed) = match outcome {
            AdvanceOutcome::Advanced { order_closed } => (false, order_closed),
            AdvanceOutcome::AlreadyAtStation => (true, false),
            AdvanceOutcome::AlreadyComplete => {
                return Err(EngineError::Validation(format!(
                    "序列号 {} 已完工",
                    unit.serial_number
                )));
            }
        };
        if order_closed {
            tracing::info!(order = %order_number, "工单完工，自动关闭");
        }

        let print = if final_step && !already_processed {
            self.print
                .dispatch(label_jobs::final_unit(&unit.serial_number, &ctx.part))
        } else {
            PrintStatusReport::NotRequired
        };

        Ok(ScanResult {
            serial_number: unit.serial_number,
            order_number: order_number.to_string(),
            operation_id: op.id,
            already_processed,
            order_closed,
            print,
        })
    }

    /// 扫描值可能带结尾字母
    fn find_scanned_unit(&self, serial: &str) -> EngineResult<SerialUnit> {
        let serial = serial.trim();
        if let Some(unit) = self.repos.serial_repo.find(serial)? {
            return Ok(unit);
        }
        let stripped = strip_suffix(serial);
        if stripped.len() != serial.len() {
            if let Some(unit) = self.repos.serial_repo.find(stripped)? {
                return Ok(unit);
            }
        }
        Err(EngineError::not_found("SerialUnit", serial))
    }

    // ==========================================
    // 完工统计
    // ==========================================

    /// 最后一条历史停留在指定工序的序列号数量
    pub fn completed_at_station(&self, order_number: &str, operation_id: &str) -> EngineResult<i64> {
        Ok(self
            .repos
            .order_repo
            .completed_at_station(order_number, operation_id)?)
    }

    /// 工单进度（按路线各工位）
    pub fn progress(&self, order_number: &str) -> EngineResult<OrderProgress> {
        let order = self
            .repos
            .order_repo
            .find_by_order_number(order_number)?
            .ok_or_else(|| EngineError::not_found("WorkOrder", order_number))?;
        let part = self
            .repos
            .catalog_repo
            .find_part(&order.part_number_id)?
            .ok_or_else(|| EngineError::not_found("PartNumber", &order.part_number_id))?;
        let route = match part.process_route_id.as_deref() {
            Some(route_id) => self.repos.catalog_repo.find_route(route_id)?,
            None => None,
        };

        let operations = self.repos.catalog_repo.list_operations()?;
        let mut stations = Vec::new();
        for step in route.map(|r| r.steps).unwrap_or_default() {
            let name = operations
                .iter()
                .find(|o| o.id == step.operation_id)
                .map(|o| o.name.clone())
                .unwrap_or_else(|| step.operation_id.clone());
            stations.push(StationProgress {
                completed: self
                    .repos
                    .order_repo
                    .completed_at_station(order_number, &step.operation_id)?,
                operation_id: step.operation_id,
                operation_name: name,
                step_order: step.step_order,
            });
        }

        Ok(OrderProgress {
            assigned: self.repos.order_repo.count_assigned(order_number)?,
            order_number: order.order_number,
            sap_order_number: order.sap_order_number,
            quantity: order.quantity,
            status: order.status,
            stations,
        })
    }

    // ==========================================
    // 工单管理
    // ==========================================

    pub fn list_orders(&self, status: Option<OrderStatus>) -> EngineResult<Vec<WorkOrder>> {
        Ok(self.repos.order_repo.list(status)?)
    }

    pub fn find_order(&self, order_number: &str) -> EngineResult<WorkOrder> {
        self.repos
            .order_repo
            .find_by_order_number(order_number)?
            .ok_or_else(|| EngineError::not_found("WorkOrder", order_number))
    }

    /// 修改数量（不得小于已分配数量，工单须为 OPEN）
    pub fn update_quantity(&self, order_number: &str, quantity: i64) -> EngineResult<WorkOrder> {
        if quantity <= 0 || quantity > self.settings.order_max_quantity {
            return Err(EngineError::Validation(format!(
                "工单数量必须在 1 到 {} 之间: {}",
                self.settings.order_max_quantity, quantity
            )));
        }
        let order = self.repos.order_repo.update_quantity(order_number, quantity)?;
        tracing::info!(order = %order_number, quantity, "工单数量已修改");
        Ok(order)
    }

    /// 手动关单
    ///
    /// # 返回
    /// - `Ok(false)`: 工单原本已关闭
    pub fn close_order(&self, order_number: &str) -> EngineResult<bool> {
        let closed = self.repos.order_repo.close(order_number)?;
        if closed {
            tracing::info!(order = %order_number, "工单已手动关闭");
        }
        Ok(closed)
    }

    /// 删除工单（已有序列号时拒绝）
    pub fn delete_order(&self, order_number: &str) -> EngineResult<()> {
        self.repos.order_repo.delete(order_number)?;
        tracing::info!(order = %order_number, "工单已删除");
        Ok(())
    }

    // ==========================================
    // 序列号查询
    // ==========================================

    pub fn find_serial(&self, serial: &str) -> EngineResult<SerialDetail> {
        let unit = self.find_scanned_unit(serial)?;
        let history = self.repos.serial_repo.history(&unit.serial_number)?;
        let print_history = self
            .repos
            .print_log_repo
            .find_by_identifier(&unit.serial_number)?;
        Ok(SerialDetail {
            unit,
            history,
            print_history,
        })
    }

    pub fn serials_of_order(&self, order_number: &str) -> EngineResult<Vec<SerialUnit>> {
        Ok(self.repos.serial_repo.list_by_order(order_number)?)
    }

    pub fn serials_of_tray(&self, tray_id: &str) -> EngineResult<Vec<SerialUnit>> {
        Ok(self.repos.serial_repo.list_by_tray(tray_id)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_operation(&self, operation_id: &str) -> EngineResult<Operation> {
        self.repos
            .catalog_repo
            .find_operation(operation_id)?
            .ok_or_else(|| EngineError::not_found("Operation", operation_id))
    }

    fn load_context(&self, order_number: &str) -> EngineResult<ProductionContext> {
        load_production_context(&self.repos, order_number)
    }
}

/// 读取工单、物料与工艺路线（物料无路线时不可生产）
pub(crate) fn load_production_context(
    repos: &MesRepositories,
    order_number: &str,
) -> EngineResult<ProductionContext> {
    let order = repos
        .order_repo
        .find_by_order_number(order_number)?
        .ok_or_else(|| EngineError::not_found("WorkOrder", order_number))?;
    let part = repos
        .catalog_repo
        .find_part(&order.part_number_id)?
        .ok_or_else(|| EngineError::not_found("PartNumber", &order.part_number_id))?;
    let route_id = part.process_route_id.clone().ok_or_else(|| {
        EngineError::Validation(format!("型号 {} 未配置工艺路线，不可生产", part.product_code))
    })?;
    let route = repos
        .catalog_repo
        .find_route(&route_id)?
        .ok_or_else(|| EngineError::not_found("ProcessRoute", &route_id))?;

    Ok(ProductionContext { order, part, route })
}

pub(crate) fn ensure_open(order: &WorkOrder) -> EngineResult<()> {
    if order.is_open() {
        Ok(())
    } else {
        Err(EngineError::Conflict(format!(
            "工单 {} 已关闭",
            order.order_number
        )))
    }
}

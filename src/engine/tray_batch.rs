// ==========================================
// 产线追溯系统 - 托盘批次引擎
// ==========================================
// 职责: 托盘生成序列号、工位加载、整盘过站、最终工位整盘完工、补打
// 依据: 路由引擎判定 + 序列号仓储原子写入
// 红线: 托盘独占检查与批量插入在同一事务内，冲突整体回滚
// 红线: 任一单件 PENDING 整盘拒绝
// 红线: 整盘完工不可逆
// ==========================================

use crate::config::MesSettings;
use crate::domain::catalog::Operation;
use crate::domain::print::PrintStatusReport;
use crate::domain::serial::SerialUnit;
use crate::domain::tray::LoadedTray;
use crate::domain::types::{SerialGenType, StepReadiness};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::order_lifecycle::{ensure_open, load_production_context, ProductionContext};
use crate::engine::print_dispatch::{label_jobs, PrintService};
use crate::engine::repositories::MesRepositories;
use crate::engine::routing::{classify_units, ensure_none_pending, ensure_station_in_route};
use crate::engine::serial_mask::{strip_suffix, SerialMask};
use crate::engine::tray_manifest::TrayManifest;
use crate::repository::{AdvanceOutcome, TrayBatchOutcome, TrayBatchRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// 结果类型
// ==========================================

/// 托盘生成结果
#[derive(Debug, Clone)]
pub struct GeneratedTray {
    pub tray_id: String,
    pub order_number: String,
    pub serial_numbers: Vec<String>,
    /// 附件类整单完工后工单关闭
    pub order_closed: bool,
    pub manifest: TrayManifest,
}

/// 整盘过站结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAllResult {
    pub marked: Vec<String>,
    pub tray: LoadedTray,
}

/// 整盘完工结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedTray {
    pub tray_id: String,
    pub finalized: Vec<String>,
    pub closed_orders: Vec<String>,
    pub print: PrintStatusReport,
}

// 加载后的托盘与其上下文
struct TrayContext {
    ctx: ProductionContext,
    op: Operation,
    units: Vec<SerialUnit>,
    tray: LoadedTray,
}

// ==========================================
// TrayBatchEngine
// ==========================================
pub struct TrayBatchEngine {
    repos: MesRepositories,
    print: Arc<PrintService>,
    settings: MesSettings,
}

impl TrayBatchEngine {
    pub fn new(repos: MesRepositories, print: Arc<PrintService>, settings: MesSettings) -> Self {
        Self {
            repos,
            print,
            settings,
        }
    }

    // ==========================================
    // 生成
    // ==========================================

    /// 在初始工位为托盘生成一批序列号
    ///
    /// # 参数
    /// - `requested`: 请求数量，实际数量 = min(托盘容量, 请求数量, 工单剩余)
    ///
    /// # 返回
    /// - `Err(Conflict)`: 托盘被其他工单的未完工单件占用 / 工单已关闭
    /// - `Err(OrderComplete)`: 工单没有剩余数量
    #[instrument(skip(self), fields(tray = %tray_id, order = %order_number))]
    pub fn generate(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
        requested: i64,
    ) -> EngineResult<GeneratedTray> {
        let tray_id = tray_id.trim();
        if tray_id.is_empty() {
            return Err(EngineError::Validation("托盘号不能为空".to_string()));
        }
        if requested <= 0 {
            return Err(EngineError::Validation(format!("生成数量必须大于 0: {}", requested)));
        }

        let ctx = load_production_context(&self.repos, order_number)?;
        let op = self.load_operation(operation_id)?;
        if !op.is_initial {
            return Err(EngineError::Validation(format!(
                "托盘只能在初始工位生成，{} 不是初始工位",
                op.name
            )));
        }
        ensure_station_in_route(&ctx.route, &op)?;
        ensure_open(&ctx.order)?;

        if ctx.part.serial_gen_type == SerialGenType::PcbSerial {
            return Err(EngineError::Validation(format!(
                "型号 {} 按单件序列号追溯，需逐件扫描登记",
                ctx.part.product_code
            )));
        }

        let mask = SerialMask::parse(&ctx.part.serial_mask)?;
        if mask.digit_slots() < self.settings.serial_min_digits {
            return Err(EngineError::Validation(format!(
                "序列号掩码 {} 至少需要 {} 位数字",
                mask.as_str(),
                self.settings.serial_min_digits
            )));
        }

        let suffix = self.settings.serial_suffix;
        let order_no = ctx.order.order_number.clone();
        let req = TrayBatchRequest {
            tray_id,
            order_number: &order_no,
            part_number_id: &ctx.part.id,
            operation_id: &op.id,
            operator_id,
            requested,
            tray_capacity: self.settings.tray_max_units,
            auto_complete: ctx.part.serial_gen_type == SerialGenType::Accessories,
        };

        let outcome = self.repos.serial_repo.generate_tray_batch(&req, |seq| {
            mask.generate(&order_no, seq, suffix).map_err(|e| e.to_string())
        })?;

        match outcome {
            TrayBatchOutcome::Generated {
                serial_numbers,
                order_closed,
            } => {
                tracing::info!(count = serial_numbers.len(), order_closed, "托盘序列号已生成");
                let manifest = TrayManifest::new(
                    &ctx.order.sap_order_number,
                    tray_id,
                    &order_no,
                    &ctx.part,
                    serial_numbers.clone(),
                );
                Ok(GeneratedTray {
                    tray_id: tray_id.to_string(),
                    order_number: order_no,
                    serial_numbers,
                    order_closed,
                    manifest,
                })
            }
            TrayBatchOutcome::TrayOccupied { blocking_order } => {
                tracing::warn!(blocking_order = %blocking_order, "托盘被占用");
                Err(EngineError::Conflict(format!(
                    "托盘 {} 仍有工单 {} 的未完工单件",
                    tray_id, blocking_order
                )))
            }
            TrayBatchOutcome::OrderClosed => {
                Err(EngineError::Conflict(format!("工单 {} 已关闭", order_no)))
            }
            TrayBatchOutcome::OrderFull { quantity, assigned } => {
                tracing::info!(quantity, assigned, "工单已无剩余数量");
                Err(EngineError::OrderComplete {
                    order_number: order_no,
                })
            }
        }
    }

    // ==========================================
    // 加载
    // ==========================================

    /// 在工位加载托盘
    ///
    /// # 返回
    /// - `Err(PendingStep)`: 存在前序未完成单件（列出全部）
    /// - `Ok(tray)`: `tray.finished` 表示本工位已全部完成，只允许补打
    pub fn load(&self, tray_id: &str, order_number: &str, operation_id: &str) -> EngineResult<LoadedTray> {
        Ok(self.load_tray(tray_id, order_number, operation_id)?.tray)
    }

    fn load_tray(&self, tray_id: &str, order_number: &str, operation_id: &str) -> EngineResult<TrayContext> {
        let tray_id = tray_id.trim();
        let ctx = load_production_context(&self.repos, order_number)?;
        let op = self.load_operation(operation_id)?;
        ensure_station_in_route(&ctx.route, &op)?;

        let units = self
            .repos
            .serial_repo
            .list_by_tray_and_order(tray_id, &ctx.order.order_number)?;
        if units.is_empty() {
            return Err(EngineError::not_found("Tray", tray_id));
        }

        let classified = classify_units(&units, &ctx.route, &op.id);
        ensure_none_pending(&op, &classified)?;

        let finished = classified
            .iter()
            .all(|u| u.readiness == StepReadiness::Ahead);
        let tray = LoadedTray {
            tray_id: tray_id.to_string(),
            order_number: ctx.order.order_number.clone(),
            operation_id: op.id.clone(),
            units: classified,
            finished,
        };

        Ok(TrayContext {
            ctx,
            op,
            units,
            tray,
        })
    }

    // ==========================================
    // 过站
    // ==========================================

    /// 单件过站（在已加载的托盘内逐件勾选）
    ///
    /// 先按整盘规则加载托盘：存在 PENDING 单件时拒绝，已完成的托盘只允许补打。
    ///
    /// # 返回
    /// - `Ok(true)`: 已过站
    /// - `Ok(false)`: 本工位已有记录，无变化
    /// - `Err(NotFound)`: 序列号不在该托盘
    #[instrument(skip(self), fields(tray = %tray_id, serial = %serial_number, op = %operation_id))]
    pub fn mark_unit(
        &self,
        tray_id: &str,
        order_number: &str,
        serial_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<bool> {
        let loaded = self.load_tray(tray_id, order_number, operation_id)?;
        if loaded.op.is_final {
            return Err(EngineError::Validation(format!(
                "最终工位 {} 需整盘完工",
                loaded.op.name
            )));
        }
        if loaded.tray.finished {
            return Err(EngineError::Validation(format!(
                "托盘 {} 在工位 {} 已完成，只允许补打",
                loaded.tray.tray_id, loaded.op.name
            )));
        }
        ensure_open(&loaded.ctx.order)?;

        let serial_number = serial_number.trim();
        let unit = loaded
            .tray
            .units
            .iter()
            .find(|u| u.serial_number == serial_number)
            .ok_or_else(|| EngineError::not_found("TrayUnit", serial_number))?;
        if unit.readiness != StepReadiness::Ready {
            tracing::debug!("单件已在本工位或之后，无变化");
            return Ok(false);
        }

        let outcome = self
            .repos
            .serial_repo
            .advance_unit(serial_number, &loaded.op.id, operator_id, false)?;
        Ok(matches!(outcome, AdvanceOutcome::Advanced { .. }))
    }

    /// 整盘过站
    ///
    /// 托盘内 READY 的单件一次性写入本工序历史；完成后重新加载托盘。
    #[instrument(skip(self), fields(tray = %tray_id, op = %operation_id))]
    pub fn mark_all(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<MarkAllResult> {
        let loaded = self.load_tray(tray_id, order_number, operation_id)?;
        if loaded.op.is_final {
            return Err(EngineError::Validation(format!(
                "最终工位 {} 需整盘完工",
                loaded.op.name
            )));
        }
        if loaded.tray.finished {
            return Err(EngineError::Validation(format!(
                "托盘 {} 在工位 {} 已完成，只允许补打",
                loaded.tray.tray_id, loaded.op.name
            )));
        }
        ensure_open(&loaded.ctx.order)?;

        let marked = self.repos.serial_repo.mark_all(
            &loaded.tray.ready_serials(),
            &loaded.op.id,
            operator_id,
        )?;
        tracing::info!(count = marked.len(), "托盘已过站");

        let tray = self.load(&loaded.tray.tray_id, order_number, operation_id)?;
        Ok(MarkAllResult { marked, tray })
    }

    /// 最终工位整盘完工（不可逆）
    ///
    /// 全部单件须 READY 或 AHEAD；置完工后派发一个多件铭牌打印任务。
    #[instrument(skip(self), fields(tray = %tray_id, op = %operation_id))]
    pub fn finalize_tray(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> EngineResult<FinalizedTray> {
        let op = self.load_operation(operation_id)?;
        if !op.is_final {
            return Err(EngineError::Validation(format!("工位 {} 不是最终工位", op.name)));
        }

        let loaded = self.load_tray(tray_id, order_number, operation_id)?;
        if loaded.tray.finished {
            return Err(EngineError::Validation(format!(
                "托盘 {} 已完工，只允许补打",
                loaded.tray.tray_id
            )));
        }

        let serials: Vec<String> = loaded
            .units
            .iter()
            .filter(|u| !u.is_complete)
            .map(|u| u.serial_number.clone())
            .collect();
        let outcome = self
            .repos
            .serial_repo
            .finalize(&serials, &loaded.op.id, operator_id)?;
        tracing::info!(
            count = outcome.finalized.len(),
            closed_orders = ?outcome.closed_orders,
            "托盘已完工"
        );

        let print = self.print.dispatch(label_jobs::tray_nameplates(
            &loaded.tray.tray_id,
            &loaded.ctx.part,
            outcome.finalized.clone(),
        ));

        Ok(FinalizedTray {
            tray_id: loaded.tray.tray_id,
            finalized: outcome.finalized,
            closed_orders: outcome.closed_orders,
            print,
        })
    }

    // ==========================================
    // 补打（完工托盘允许）
    // ==========================================

    /// 工单补打（铭牌除外）
    pub fn reprint_order(&self, order_number: &str, quantity: i64) -> EngineResult<PrintStatusReport> {
        if quantity <= 0 {
            return Err(EngineError::Validation(format!("补打数量必须大于 0: {}", quantity)));
        }
        let ctx = load_production_context(&self.repos, order_number)?;
        Ok(self.print.dispatch(label_jobs::order_reprint(
            &ctx.order.order_number,
            &ctx.part,
            quantity,
        )))
    }

    /// 按三位流水号补打托盘内单件
    pub fn reprint_unit(
        &self,
        tray_id: &str,
        order_number: &str,
        sequence: &str,
    ) -> EngineResult<PrintStatusReport> {
        let seq: u32 = sequence
            .trim()
            .parse()
            .map_err(|_| EngineError::Validation(format!("流水号无效: {}", sequence)))?;
        let seq_text = format!("{:03}", seq);

        let ctx = load_production_context(&self.repos, order_number)?;
        let unit = self
            .repos
            .serial_repo
            .list_by_tray_and_order(tray_id.trim(), &ctx.order.order_number)?
            .into_iter()
            .find(|u| strip_suffix(&u.serial_number).ends_with(&seq_text))
            .ok_or_else(|| {
                EngineError::not_found("SerialUnit", &format!("{} #{}", tray_id.trim(), seq_text))
            })?;

        Ok(self
            .print
            .dispatch(label_jobs::unit_reprint(&unit.serial_number, &ctx.part)))
    }

    /// 托盘箱标（数量 = 托盘内单件数）
    pub fn print_box_label(&self, tray_id: &str, order_number: &str) -> EngineResult<PrintStatusReport> {
        let ctx = load_production_context(&self.repos, order_number)?;
        let count = self
            .repos
            .serial_repo
            .list_by_tray_and_order(tray_id.trim(), &ctx.order.order_number)?
            .len() as i64;
        if count == 0 {
            return Err(EngineError::not_found("Tray", tray_id.trim()));
        }
        Ok(self
            .print
            .dispatch(label_jobs::box_label(tray_id.trim(), &ctx.part, count)))
    }

    /// 重新生成托盘清单
    pub fn manifest(&self, tray_id: &str, order_number: &str) -> EngineResult<TrayManifest> {
        let ctx = load_production_context(&self.repos, order_number)?;
        let serials: Vec<String> = self
            .repos
            .serial_repo
            .list_by_tray_and_order(tray_id.trim(), &ctx.order.order_number)?
            .into_iter()
            .map(|u| u.serial_number)
            .collect();
        if serials.is_empty() {
            return Err(EngineError::not_found("Tray", tray_id.trim()));
        }
        Ok(TrayManifest::new(
            &ctx.order.sap_order_number,
            tray_id.trim(),
            &ctx.order.order_number,
            &ctx.part,
            serials,
        ))
    }

    fn load_operation(&self, operation_id: &str) -> EngineResult<Operation> {
        self.repos
            .catalog_repo
            .find_operation(operation_id)?
            .ok_or_else(|| EngineError::not_found("Operation", operation_id))
    }
}

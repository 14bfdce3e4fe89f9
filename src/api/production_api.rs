// ==========================================
// 产线追溯系统 - 生产操作 API
// ==========================================
// 职责: 扫描解析、单件扫描、托盘生成/加载/过站/完工、补打、清单导出
// ==========================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::print::PrintStatusReport;
use crate::domain::tray::LoadedTray;
use crate::engine::context_resolver::{match_part_for_serial, ContextResolver, ResolvedContext};
use crate::engine::order_lifecycle::{OrderLifecycleEngine, ScanResult};
use crate::engine::tray_batch::{FinalizedTray, MarkAllResult, TrayBatchEngine};

/// 托盘生成响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTrayResponse {
    pub tray_id: String,
    pub order_number: String,
    pub serial_numbers: Vec<String>,
    pub order_closed: bool,
    /// 清单文件（配置了导出目录时）
    pub manifest_path: Option<PathBuf>,
}

// ==========================================
// ProductionApi - 生产操作 API
// ==========================================
pub struct ProductionApi {
    order_engine: Arc<OrderLifecycleEngine>,
    tray_engine: Arc<TrayBatchEngine>,
    resolver: Arc<ContextResolver>,
    manifest_dir: Option<PathBuf>,
}

impl ProductionApi {
    pub fn new(
        order_engine: Arc<OrderLifecycleEngine>,
        tray_engine: Arc<TrayBatchEngine>,
        resolver: Arc<ContextResolver>,
        manifest_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            order_engine,
            tray_engine,
            resolver,
            manifest_dir,
        }
    }

    // ==========================================
    // 扫描解析
    // ==========================================

    /// 解析扫描值（SAP 工单号 / 托盘号）
    pub fn resolve_scan(&self, token: &str, route_id: &str) -> ApiResult<ResolvedContext> {
        require(token, "扫描值")?;
        require(route_id, "工艺路线")?;
        Ok(self.resolver.resolve(token, route_id)?)
    }

    // ==========================================
    // 单件扫描
    // ==========================================

    pub fn scan_initial(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<ScanResult> {
        require_scan(serial, order_number, operation_id, operator)?;
        Ok(self
            .order_engine
            .process_initial(serial, order_number, operation_id, operator)?)
    }

    /// 先解析上下文，再按掩码确定序列号所属物料与工单后登记
    pub fn scan_initial_in_context(
        &self,
        serial: &str,
        token: &str,
        route_id: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<ScanResult> {
        require(serial, "序列号")?;
        let ctx = self.resolve_scan(token, route_id)?;
        let part = match_part_for_serial(serial, &ctx.parts).ok_or_else(|| {
            ApiError::ValidationError(format!("序列号 {} 与候选型号的掩码均不匹配", serial.trim()))
        })?;
        let order = ctx
            .orders
            .iter()
            .find(|o| o.part_number_id == part.id)
            .ok_or_else(|| ApiError::NotFound(format!("型号 {} 的 OPEN 工单", part.product_code)))?;

        self.scan_initial(serial, &order.order_number, operation_id, operator)
    }

    pub fn scan_standard(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<ScanResult> {
        require_scan(serial, order_number, operation_id, operator)?;
        Ok(self
            .order_engine
            .process_standard(serial, order_number, operation_id, operator)?)
    }

    pub fn scan_final(
        &self,
        serial: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<ScanResult> {
        require_scan(serial, order_number, operation_id, operator)?;
        Ok(self
            .order_engine
            .process_final(serial, order_number, operation_id, operator)?)
    }

    // ==========================================
    // 托盘
    // ==========================================

    /// 生成托盘序列号（配置了导出目录时同时写出清单）
    pub fn generate_tray(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
        quantity: i64,
    ) -> ApiResult<GenerateTrayResponse> {
        require(tray_id, "托盘号")?;
        require(order_number, "工单号")?;
        require(operation_id, "工序ID")?;
        require(operator, "操作员")?;

        let generated =
            self.tray_engine
                .generate(tray_id, order_number, operation_id, operator, quantity)?;

        // 序列号已提交，清单写出失败只记日志
        let manifest_path = match &self.manifest_dir {
            Some(dir) => match generated.manifest.write_to_dir(dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(tray = %generated.tray_id, error = %e, "托盘清单写出失败");
                    None
                }
            },
            None => None,
        };

        Ok(GenerateTrayResponse {
            tray_id: generated.tray_id,
            order_number: generated.order_number,
            serial_numbers: generated.serial_numbers,
            order_closed: generated.order_closed,
            manifest_path,
        })
    }

    pub fn load_tray(&self, tray_id: &str, order_number: &str, operation_id: &str) -> ApiResult<LoadedTray> {
        require(tray_id, "托盘号")?;
        require(order_number, "工单号")?;
        require(operation_id, "工序ID")?;
        Ok(self.tray_engine.load(tray_id, order_number, operation_id)?)
    }

    pub fn mark_unit(
        &self,
        tray_id: &str,
        order_number: &str,
        serial: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<bool> {
        require(tray_id, "托盘号")?;
        require(order_number, "工单号")?;
        require(serial, "序列号")?;
        require(operation_id, "工序ID")?;
        require(operator, "操作员")?;
        Ok(self
            .tray_engine
            .mark_unit(tray_id, order_number, serial, operation_id, operator)?)
    }

    pub fn mark_all(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<MarkAllResult> {
        require(tray_id, "托盘号")?;
        require(operator, "操作员")?;
        Ok(self
            .tray_engine
            .mark_all(tray_id, order_number, operation_id, operator)?)
    }

    pub fn finalize_tray(
        &self,
        tray_id: &str,
        order_number: &str,
        operation_id: &str,
        operator: &str,
    ) -> ApiResult<FinalizedTray> {
        require(tray_id, "托盘号")?;
        require(operator, "操作员")?;
        Ok(self
            .tray_engine
            .finalize_tray(tray_id, order_number, operation_id, operator)?)
    }

    // ==========================================
    // 补打与导出
    // ==========================================

    pub fn reprint_order(&self, order_number: &str, quantity: i64) -> ApiResult<PrintStatusReport> {
        require(order_number, "工单号")?;
        Ok(self.tray_engine.reprint_order(order_number, quantity)?)
    }

    pub fn reprint_unit(&self, tray_id: &str, order_number: &str, sequence: &str) -> ApiResult<PrintStatusReport> {
        require(tray_id, "托盘号")?;
        require(sequence, "流水号")?;
        Ok(self.tray_engine.reprint_unit(tray_id, order_number, sequence)?)
    }

    pub fn print_box_label(&self, tray_id: &str, order_number: &str) -> ApiResult<PrintStatusReport> {
        require(tray_id, "托盘号")?;
        Ok(self.tray_engine.print_box_label(tray_id, order_number)?)
    }

    /// 重新导出托盘清单
    pub fn export_manifest(&self, tray_id: &str, order_number: &str, dir: &Path) -> ApiResult<PathBuf> {
        require(tray_id, "托盘号")?;
        let manifest = self.tray_engine.manifest(tray_id, order_number)?;
        Ok(manifest.write_to_dir(dir)?)
    }
}

fn require_scan(serial: &str, order_number: &str, operation_id: &str, operator: &str) -> ApiResult<()> {
    require(serial, "序列号")?;
    require(order_number, "工单号")?;
    require(operation_id, "工序ID")?;
    require(operator, "操作员")
}

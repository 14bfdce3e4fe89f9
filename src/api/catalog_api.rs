// ==========================================
// 产线追溯系统 - 目录维护 API
// ==========================================
// 职责: 工序、工艺路线、物料维护
// 路线保存前校验: 非空、工序不重复、步序为正且不重复、包含初始工序
// ==========================================

use std::sync::Arc;

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::catalog::{Operation, PartNumber, ProcessRoute};
use crate::engine::serial_mask::SerialMask;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::catalog_repo::CatalogRepository;

pub struct CatalogApi {
    catalog_repo: Arc<CatalogRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl CatalogApi {
    pub fn new(catalog_repo: Arc<CatalogRepository>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            catalog_repo,
            action_log_repo,
        }
    }

    // ===== 工序 =====

    /// 工序列表（含当前占用人）
    pub fn list_operations(&self) -> ApiResult<Vec<Operation>> {
        Ok(self.catalog_repo.list_operations()?)
    }

    pub fn save_operation(&self, op: &Operation) -> ApiResult<()> {
        require(&op.id, "工序ID")?;
        require(&op.name, "工序名称")?;
        Ok(self.catalog_repo.upsert_operation(op)?)
    }

    // ===== 工艺路线 =====

    pub fn list_routes(&self) -> ApiResult<Vec<ProcessRoute>> {
        Ok(self.catalog_repo.list_routes()?)
    }

    pub fn get_route(&self, route_id: &str) -> ApiResult<ProcessRoute> {
        require(route_id, "路线ID")?;
        self.catalog_repo
            .find_route(route_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ProcessRoute(id={})不存在", route_id)))
    }

    /// 保存工艺路线（路线与步骤整体替换）
    pub fn save_route(&self, route: &ProcessRoute, operator: &str) -> ApiResult<()> {
        require(&route.id, "路线ID")?;
        require(&route.name, "路线名称")?;
        require(operator, "操作人")?;

        self.catalog_repo.save_route(route)?;

        let steps: Vec<serde_json::Value> = route
            .steps
            .iter()
            .map(|s| serde_json::json!({ "operation_id": s.operation_id, "step_order": s.step_order }))
            .collect();
        let log = ActionLog::new(ActionType::SaveRoute, operator, Some(&route.id))
            .with_payload(serde_json::json!({ "name": route.name, "steps": steps }));
        self.action_log_repo.insert(&log)?;
        Ok(())
    }

    /// 删除工艺路线，关联物料解除绑定
    ///
    /// # 返回
    /// 被解除绑定的物料数
    pub fn delete_route(&self, route_id: &str, operator: &str) -> ApiResult<usize> {
        require(route_id, "路线ID")?;
        require(operator, "操作人")?;

        let unlinked = self.catalog_repo.delete_route(route_id)?;

        let log = ActionLog::new(ActionType::DeleteRoute, operator, Some(route_id))
            .with_detail(format!("删除工艺路线 {}，解除 {} 个物料", route_id, unlinked));
        self.action_log_repo.insert(&log)?;
        Ok(unlinked)
    }

    // ===== 物料 =====

    pub fn list_parts(&self) -> ApiResult<Vec<PartNumber>> {
        Ok(self.catalog_repo.list_parts()?)
    }

    pub fn parts_by_product_code(&self, product_code: &str) -> ApiResult<Vec<PartNumber>> {
        require(product_code, "型号")?;
        Ok(self.catalog_repo.find_parts_by_product_code(product_code.trim())?)
    }

    /// 保存物料（掩码必须可解析，路线必须存在）
    pub fn save_part(&self, part: &PartNumber) -> ApiResult<()> {
        require(&part.id, "物料ID")?;
        require(&part.part_number, "料号")?;
        require(&part.product_code, "型号")?;
        SerialMask::parse(&part.serial_mask)?;

        if let Some(route_id) = part.process_route_id.as_deref() {
            if self.catalog_repo.find_route(route_id)?.is_none() {
                return Err(ApiError::NotFound(format!("ProcessRoute(id={})不存在", route_id)));
            }
        }
        Ok(self.catalog_repo.upsert_part(part)?)
    }
}

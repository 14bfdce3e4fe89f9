// ==========================================
// 产线追溯系统 - 工单管理 API
// ==========================================
// 职责: 创建工单、进度查询、修改数量、关单、删单、序列号查询
// 主管类操作写入 ActionLog
// ==========================================

use std::sync::Arc;

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::order::{OrderProgress, WorkOrder};
use crate::domain::serial::{SerialDetail, SerialUnit};
use crate::domain::types::OrderStatus;
use crate::engine::order_lifecycle::{CreatedOrder, OrderLifecycleEngine};
use crate::repository::action_log_repo::ActionLogRepository;

// ==========================================
// OrderApi - 工单管理 API
// ==========================================
pub struct OrderApi {
    order_engine: Arc<OrderLifecycleEngine>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl OrderApi {
    pub fn new(
        order_engine: Arc<OrderLifecycleEngine>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            order_engine,
            action_log_repo,
        }
    }

    /// 创建工单
    ///
    /// # 参数
    /// - sap_order_number: SAP 工单号
    /// - product_code: 扫描的型号
    /// - quantity: 数量
    /// - route_id: 当前工艺路线
    /// - operator: 操作人
    pub fn create_order(
        &self,
        sap_order_number: &str,
        product_code: &str,
        quantity: i64,
        route_id: &str,
        operator: &str,
    ) -> ApiResult<CreatedOrder> {
        require(sap_order_number, "SAP工单号")?;
        require(product_code, "型号")?;
        require(route_id, "工艺路线")?;
        require(operator, "操作人")?;

        let created = self
            .order_engine
            .create_order(sap_order_number, product_code, quantity, route_id)?;

        let log = ActionLog::new(
            ActionType::CreateOrder,
            operator,
            Some(&created.order.order_number),
        )
        .with_payload(serde_json::json!({
            "sap_order_number": created.order.sap_order_number,
            "part_number_id": created.part.id,
            "quantity": quantity,
        }));
        self.action_log_repo.insert(&log)?;

        Ok(created)
    }

    pub fn list_orders(&self, status: Option<OrderStatus>) -> ApiResult<Vec<WorkOrder>> {
        Ok(self.order_engine.list_orders(status)?)
    }

    pub fn get_order(&self, order_number: &str) -> ApiResult<WorkOrder> {
        require(order_number, "工单号")?;
        Ok(self.order_engine.find_order(order_number)?)
    }

    /// 工单进度（各工位完工数 + 已分配数）
    pub fn get_progress(&self, order_number: &str) -> ApiResult<OrderProgress> {
        require(order_number, "工单号")?;
        Ok(self.order_engine.progress(order_number)?)
    }

    pub fn completed_at_station(&self, order_number: &str, operation_id: &str) -> ApiResult<i64> {
        require(order_number, "工单号")?;
        require(operation_id, "工序ID")?;
        Ok(self
            .order_engine
            .completed_at_station(order_number, operation_id)?)
    }

    /// 修改数量
    pub fn update_quantity(
        &self,
        order_number: &str,
        quantity: i64,
        operator: &str,
        reason: &str,
    ) -> ApiResult<WorkOrder> {
        require(order_number, "工单号")?;
        require(operator, "操作人")?;
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作原因不能为空".to_string()));
        }

        let before = self.order_engine.find_order(order_number)?;
        let order = self.order_engine.update_quantity(order_number, quantity)?;

        let log = ActionLog::new(ActionType::UpdateQuantity, operator, Some(order_number))
            .with_payload(serde_json::json!({
                "from": before.quantity,
                "to": quantity,
                "reason": reason,
            }));
        self.action_log_repo.insert(&log)?;

        Ok(order)
    }

    /// 手动关单
    pub fn close_order(&self, order_number: &str, operator: &str) -> ApiResult<bool> {
        require(order_number, "工单号")?;
        require(operator, "操作人")?;

        let closed = self.order_engine.close_order(order_number)?;
        if closed {
            let log = ActionLog::new(ActionType::CloseOrder, operator, Some(order_number))
                .with_detail(format!("手动关闭工单 {}", order_number));
            self.action_log_repo.insert(&log)?;
        }
        Ok(closed)
    }

    /// 删除工单（已有序列号时拒绝）
    pub fn delete_order(&self, order_number: &str, operator: &str) -> ApiResult<()> {
        require(order_number, "工单号")?;
        require(operator, "操作人")?;

        self.order_engine.delete_order(order_number)?;

        let log = ActionLog::new(ActionType::DeleteOrder, operator, Some(order_number))
            .with_detail(format!("删除工单 {}", order_number));
        self.action_log_repo.insert(&log)?;
        Ok(())
    }

    // ==========================================
    // 序列号查询
    // ==========================================

    pub fn find_serial(&self, serial: &str) -> ApiResult<SerialDetail> {
        require(serial, "序列号")?;
        Ok(self.order_engine.find_serial(serial)?)
    }

    pub fn serials_of_order(&self, order_number: &str) -> ApiResult<Vec<SerialUnit>> {
        require(order_number, "工单号")?;
        Ok(self.order_engine.serials_of_order(order_number)?)
    }

    pub fn serials_of_tray(&self, tray_id: &str) -> ApiResult<Vec<SerialUnit>> {
        require(tray_id, "托盘号")?;
        Ok(self.order_engine.serials_of_tray(tray_id)?)
    }

    /// 工单的操作记录
    pub fn order_actions(&self, order_number: &str) -> ApiResult<Vec<ActionLog>> {
        require(order_number, "工单号")?;
        Ok(self.action_log_repo.find_by_target(order_number)?)
    }

    /// 最近的主管操作（全部对象）
    pub fn recent_actions(&self, limit: usize) -> ApiResult<Vec<ActionLog>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("查询条数必须大于0".to_string()));
        }
        Ok(self.action_log_repo.find_recent(limit)?)
    }
}

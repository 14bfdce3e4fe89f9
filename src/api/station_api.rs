// ==========================================
// 产线追溯系统 - 工位 API
// ==========================================
// 职责: 进入/离开工位、主管强制解锁、工位状态查询
// ==========================================

use std::sync::Arc;

use crate::api::error::{require, ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::station::{StationLock, StationState, StationStatus};
use crate::engine::repositories::MesRepositories;
use crate::engine::station_lock::{StationLockManager, StationSession};
use crate::engine::station_monitor;

// ==========================================
// StationApi - 工位 API
// ==========================================

/// 工位API
///
/// 职责：
/// 1. 工位占用与释放
/// 2. 强制解锁（记录 ActionLog）
/// 3. 工位状态快照
pub struct StationApi {
    lock_manager: Arc<StationLockManager>,
    repos: MesRepositories,
}

impl StationApi {
    pub fn new(lock_manager: Arc<StationLockManager>, repos: MesRepositories) -> Self {
        Self {
            lock_manager,
            repos,
        }
    }

    /// 进入工位
    ///
    /// # 返回
    /// - Ok(StationLock): 当前锁（本人持有）
    /// - Err(ApiError::Conflict): 工位被其他人占用
    pub fn enter_station(&self, operation_id: &str, user_id: &str) -> ApiResult<StationLock> {
        require(operation_id, "工序ID")?;
        require(user_id, "操作员")?;
        Ok(self.lock_manager.enter(operation_id, user_id)?)
    }

    /// 以作用域方式进入工位
    pub fn open_session(&self, operation_id: &str, user_id: &str) -> ApiResult<StationSession> {
        require(operation_id, "工序ID")?;
        require(user_id, "操作员")?;
        Ok(self.lock_manager.session(operation_id, user_id)?)
    }

    /// 离开工位（非持有人无变化）
    pub fn exit_station(&self, operation_id: &str, user_id: &str) -> ApiResult<bool> {
        require(operation_id, "工序ID")?;
        Ok(self.lock_manager.exit(operation_id, user_id)?)
    }

    /// 强制解锁
    ///
    /// # 参数
    /// - supervisor: 主管
    /// - reason: 操作原因
    pub fn force_unlock(
        &self,
        operation_id: &str,
        supervisor: &str,
        reason: &str,
    ) -> ApiResult<Option<StationLock>> {
        require(operation_id, "工序ID")?;
        require(supervisor, "操作人")?;
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作原因不能为空".to_string()));
        }

        let previous = self.lock_manager.force_unlock(operation_id)?;

        let log = ActionLog::new(ActionType::ForceUnlock, supervisor, Some(operation_id))
            .with_payload(serde_json::json!({
                "previous_owner": previous.as_ref().map(|l| l.owner_id.clone()),
                "reason": reason,
            }))
            .with_detail(format!("强制解锁工位 {}", operation_id));
        self.repos.action_log_repo.insert(&log)?;

        Ok(previous)
    }

    pub fn station_state(&self, operation_id: &str) -> ApiResult<StationState> {
        require(operation_id, "工序ID")?;
        Ok(self.lock_manager.state(operation_id)?)
    }

    /// 全部工位状态（即时读取）
    pub fn station_statuses(&self) -> ApiResult<Vec<StationStatus>> {
        Ok(station_monitor::snapshot(&self.repos)?)
    }
}

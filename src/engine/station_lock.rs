// ==========================================
// 产线追溯系统 - 工位锁管理
// ==========================================
// 状态: FREE / HELD(owner)
// - enter: FREE→HELD(u)；HELD(u)→HELD(u)；HELD(其他人)→Conflict 且不修改
// - exit: HELD(u)→FREE；其他情况无变化
// - force_unlock: 任意→FREE
// 红线: 作用域占用（StationSession）在任何退出路径上都释放
// ==========================================

use crate::domain::station::{StationLock, StationState};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::{CatalogRepository, StationLockRepository};
use std::sync::Arc;
use tracing::instrument;

pub struct StationLockManager {
    lock_repo: Arc<StationLockRepository>,
    catalog_repo: Arc<CatalogRepository>,
}

impl StationLockManager {
    pub fn new(lock_repo: Arc<StationLockRepository>, catalog_repo: Arc<CatalogRepository>) -> Self {
        Self {
            lock_repo,
            catalog_repo,
        }
    }

    /// 占用工位
    ///
    /// # 返回
    /// - `Ok(StationLock)`: 当前锁（本人持有）
    /// - `Err(Conflict)`: 工位被其他人占用
    /// - `Err(NotFound)`: 工序不存在
    #[instrument(skip(self), fields(operation_id = %operation_id, user_id = %user_id))]
    pub fn enter(&self, operation_id: &str, user_id: &str) -> EngineResult<StationLock> {
        let op = self
            .catalog_repo
            .find_operation(operation_id)?
            .ok_or_else(|| EngineError::not_found("Operation", operation_id))?;

        if self.lock_repo.try_acquire(operation_id, user_id)? {
            let lock = self
                .lock_repo
                .find(operation_id)?
                .ok_or_else(|| EngineError::Conflict(format!("工位 {} 已被释放", op.name)))?;
            tracing::info!("工位已占用");
            return Ok(lock);
        }

        let holder = self
            .lock_repo
            .find(operation_id)?
            .map(|l| l.owner_id)
            .unwrap_or_default();
        tracing::warn!(holder = %holder, "工位占用被拒绝");
        Err(EngineError::Conflict(format!(
            "工位 {} 正由 {} 使用",
            op.name, holder
        )))
    }

    /// 离开工位（仅持有人本人生效）
    ///
    /// # 返回
    /// - `Ok(true)`: 已释放
    /// - `Ok(false)`: 无变化
    #[instrument(skip(self), fields(operation_id = %operation_id, user_id = %user_id))]
    pub fn exit(&self, operation_id: &str, user_id: &str) -> EngineResult<bool> {
        let released = self.lock_repo.release(operation_id, user_id)?;
        if released {
            tracing::info!("工位已释放");
        } else {
            tracing::debug!("非持有人离开工位，无变化");
        }
        Ok(released)
    }

    /// 强制解锁（主管操作）
    ///
    /// # 返回
    /// 解锁前的持有记录
    #[instrument(skip(self), fields(operation_id = %operation_id))]
    pub fn force_unlock(&self, operation_id: &str) -> EngineResult<Option<StationLock>> {
        let previous = self.lock_repo.force_release(operation_id)?;
        if let Some(lock) = &previous {
            tracing::warn!(previous_owner = %lock.owner_id, "工位被强制解锁");
        }
        Ok(previous)
    }

    pub fn state(&self, operation_id: &str) -> EngineResult<StationState> {
        let lock = self.lock_repo.find(operation_id)?;
        Ok(StationState::from_lock(lock.as_ref()))
    }

    /// 以作用域方式占用工位，离开作用域时自动释放
    pub fn session(&self, operation_id: &str, user_id: &str) -> EngineResult<StationSession> {
        self.enter(operation_id, user_id)?;
        Ok(StationSession {
            lock_repo: self.lock_repo.clone(),
            operation_id: operation_id.to_string(),
            user_id: user_id.to_string(),
            released: false,
        })
    }
}

// ==========================================
// StationSession - 工位占用守卫
// ==========================================
pub struct StationSession {
    lock_repo: Arc<StationLockRepository>,
    operation_id: String,
    user_id: String,
    released: bool,
}

impl StationSession {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 显式释放（可获取错误）
    pub fn release(mut self) -> EngineResult<bool> {
        self.released = true;
        Ok(self.lock_repo.release(&self.operation_id, &self.user_id)?)
    }
}

impl Drop for StationSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock_repo.release(&self.operation_id, &self.user_id) {
            tracing::error!(
                operation_id = %self.operation_id,
                user_id = %self.user_id,
                error = %e,
                "工位释放失败"
            );
        }
    }
}

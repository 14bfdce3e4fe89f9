// ==========================================
// 产线追溯系统 - 运行配置 API
// ==========================================
// 职责: 配置查询、更新（只允许已知配置项）
// 修改在下次加载 MesSettings 时生效
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{require, ApiResult};
use crate::config::config_manager::{ConfigManager, MesSettings};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::action_log_repo::ActionLogRepository;

/// 配置项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
}

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================
pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ConfigApi {
    pub fn new(config_manager: Arc<ConfigManager>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            config_manager,
            action_log_repo,
        }
    }

    /// 已写入的配置项（未写入的使用默认值）
    pub fn list_configs(&self) -> ApiResult<Vec<ConfigItem>> {
        Ok(self
            .config_manager
            .get_config_snapshot()?
            .into_iter()
            .map(|(key, value)| ConfigItem { key, value })
            .collect())
    }

    /// 生效值（含默认值）
    pub fn effective_settings(&self) -> ApiResult<MesSettings> {
        Ok(self.config_manager.load_settings()?)
    }

    /// 更新配置
    pub fn update_config(&self, key: &str, value: &str, operator: &str, reason: &str) -> ApiResult<()> {
        require(key, "配置键")?;
        require(value, "配置值")?;
        require(operator, "操作人")?;
        require(reason, "操作原因")?;

        let old_value = self.config_manager.get_global_config_value(key)?;
        self.config_manager.set_global_config_value(key, value.trim())?;

        let log = ActionLog::new(ActionType::UpdateConfig, operator, Some(key)).with_payload(
            serde_json::json!({
                "old_value": old_value,
                "new_value": value.trim(),
                "reason": reason,
            }),
        );
        self.action_log_repo.insert(&log)?;
        tracing::info!(key, value = value.trim(), "配置已更新");
        Ok(())
    }
}

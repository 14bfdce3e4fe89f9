// ==========================================
// 产线追溯系统 - 引擎层错误类型
// ==========================================
// 前五类错误中止当前操作并给出具体信息；
// 打印失败不在此列，由调用点降级为 PrintStatusReport::Warning
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("校验失败: {0}")]
    Validation(String),

    #[error("冲突: {0}")]
    Conflict(String),

    #[error("未找到: {entity} {id}")]
    NotFound { entity: String, id: String },

    #[error("型号 {product_code} 不属于当前工艺路线 {route_id}")]
    RouteMismatch { product_code: String, route_id: String },

    #[error("工位 {station} 前序工序未完成: {}", .blocking.join(", "))]
    PendingStep {
        station: String,
        /// 阻塞的序列号
        blocking: Vec<String>,
    },

    #[error("工单 {order_number} 已完成，没有剩余数量")]
    OrderComplete { order_number: String },

    #[error("文件导出失败: {0}")]
    Export(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// 仓储错误按类别映射，其余原样透传
impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => EngineError::Conflict(msg),
            RepositoryError::ValidationError(msg) => EngineError::Validation(msg),
            other => EngineError::Repository(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// ==========================================
// 产线追溯系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把引擎/仓储错误转换为面向操作员的消息
// 所有错误信息必须包含具体原因
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 产线规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("操作冲突: {0}")]
    Conflict(String),

    #[error("工艺路线不匹配: 型号 {product_code} 不属于路线 {route_id}")]
    RouteMismatch { product_code: String, route_id: String },

    #[error("前序工序未完成: 工位 {station}, 阻塞单件 {}", .blocking.join(", "))]
    PendingStep { station: String, blocking: Vec<String> },

    #[error("工单已完成: {0}")]
    OrderComplete(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("文件导出失败: {0}")]
    ExportError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::Conflict(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::Conflict(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 EngineError 转换（保持错误类别）
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::Conflict(msg) => ApiError::Conflict(msg),
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            EngineError::RouteMismatch {
                product_code,
                route_id,
            } => ApiError::RouteMismatch {
                product_code,
                route_id,
            },
            EngineError::PendingStep { station, blocking } => {
                ApiError::PendingStep { station, blocking }
            }
            EngineError::OrderComplete { order_number } => ApiError::OrderComplete(order_number),
            EngineError::Export(msg) => ApiError::ExportError(msg),
            EngineError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 非空校验
pub(crate) fn require(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        Err(ApiError::InvalidInput(format!("{}不能为空", field)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: "KA001".to_string(),
        }
        .into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("WorkOrder"));
                assert!(msg.contains("KA001"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_engine_error_keeps_category() {
        let api_err: ApiError = EngineError::PendingStep {
            station: "Pack".to_string(),
            blocking: vec!["KA001-001M".to_string()],
        }
        .into();
        assert!(matches!(api_err, ApiError::PendingStep { .. }));
        assert!(api_err.to_string().contains("KA001-001M"));

        let api_err: ApiError =
            EngineError::Repository(RepositoryError::DatabaseQueryError("disk".into())).into();
        assert!(matches!(api_err, ApiError::DatabaseError(_)));
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("  ", "工位").is_err());
        assert!(require("OP10", "工位").is_ok());
    }
}

// ==========================================
// 产线追溯系统 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 多步检查-写入在单个事务内完成
// ==========================================

pub mod action_log_repo;
pub mod catalog_repo;
pub mod error;
pub mod order_repo;
pub mod print_log_repo;
pub mod serial_repo;
pub mod sql_util;
pub mod station_lock_repo;
pub mod test_log_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use catalog_repo::CatalogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use order_repo::OrderRepository;
pub use print_log_repo::PrintLogRepository;
pub use serial_repo::{
    AdvanceOutcome, FinalizeOutcome, RegisterOutcome, SerialRepository, TrayBatchOutcome,
    TrayBatchRequest,
};
pub use station_lock_repo::StationLockRepository;
pub use test_log_repo::TestLogRepository;

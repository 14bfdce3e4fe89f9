// ==========================================
// 产线追溯系统 - API 层
// ==========================================
// 职责: 面向操作终端的业务接口，参数校验 + 主管操作审计
// ==========================================

pub mod catalog_api;
pub mod config_api;
pub mod error;
pub mod order_api;
pub mod production_api;
pub mod station_api;

// 重导出核心类型
pub use catalog_api::CatalogApi;
pub use config_api::{ConfigApi, ConfigItem};
pub use error::{ApiError, ApiResult};
pub use order_api::OrderApi;
pub use production_api::{GenerateTrayResponse, ProductionApi};
pub use station_api::StationApi;

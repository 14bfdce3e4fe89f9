// ==========================================
// 产线追溯系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 核心: 工艺路线判定、托盘批次、工位锁状态机
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 运行配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{OrderStatus, SerialGenType, StepReadiness};

// 领域实体
pub use domain::{
    ActionLog, ActionType, LoadedTray, Operation, PartNumber, ProcessRoute, RouteStep,
    SerialUnit, StationLock, StationState, WorkOrder,
};

// 引擎
pub use engine::{
    ContextResolver, EngineError, OrderLifecycleEngine, StationLockManager, TrayBatchEngine,
};

// API
pub use api::{ApiError, CatalogApi, OrderApi, ProductionApi, StationApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "产线追溯系统";

// ==========================================
// 产线追溯系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、纯业务规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod catalog;
pub mod order;
pub mod print;
pub mod serial;
pub mod station;
pub mod tray;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use catalog::{Operation, PartNumber, ProcessRoute, RouteStep};
pub use order::{OrderProgress, StationProgress, WorkOrder};
pub use print::{PrintField, PrintJob, PrintStatusReport};
pub use serial::{
    HistoryEntry, NewSerialUnit, PrintLogEntry, SerialDetail, SerialUnit, TestLogRecord,
};
pub use station::{StationLock, StationState, StationStatus};
pub use tray::{plan_batch_size, LoadedTray, TrayUnit, TRAY_HARD_CAP};
pub use types::{
    LabelDataSource, LabelType, OrderStatus, PrintStatus, SerialGenType, StepReadiness,
    TIMESTAMP_FORMAT,
};

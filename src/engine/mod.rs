// ==========================================
// 产线追溯系统 - 引擎层
// ==========================================
// 职责: 工艺路线判定、托盘批次、工位锁、工单/单件生命周期
// 红线: Engine 不拼 SQL，原子性由仓储层事务保证
// ==========================================

pub mod context_resolver;
pub mod error;
pub mod lot_number;
pub mod order_lifecycle;
pub mod print_dispatch;
pub mod repositories;
pub mod routing;
pub mod serial_mask;
pub mod station_lock;
pub mod station_monitor;
pub mod tray_batch;
pub mod tray_manifest;

// 重导出核心引擎
pub use context_resolver::{
    match_part_for_serial, ContextResolver, ContextStrategy, ResolvedContext, SapOrderStrategy,
    TrayStrategy,
};
pub use error::{EngineError, EngineResult};
pub use order_lifecycle::{CreatedOrder, OrderLifecycleEngine, ProductionContext, ScanResult};
pub use print_dispatch::{
    NoOpPrintDispatcher, PrintDispatcher, PrintError, PrintService, RecordingPrintDispatcher,
};
pub use repositories::MesRepositories;
pub use routing::classify;
pub use serial_mask::SerialMask;
pub use station_lock::{StationLockManager, StationSession};
pub use tray_batch::{FinalizedTray, GeneratedTray, MarkAllResult, TrayBatchEngine};
pub use tray_manifest::TrayManifest;

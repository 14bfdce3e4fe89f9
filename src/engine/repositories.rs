// ==========================================
// 产线追溯系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合各引擎所需的 Repository，简化构造
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    ActionLogRepository, CatalogRepository, OrderRepository, PrintLogRepository,
    SerialRepository, StationLockRepository, TestLogRepository,
};

/// 产线追溯仓储集合
///
/// 全部仓储共享同一个连接。
#[derive(Clone)]
pub struct MesRepositories {
    /// 目录（工序 / 路线 / 物料）
    pub catalog_repo: Arc<CatalogRepository>,
    /// 工单
    pub order_repo: Arc<OrderRepository>,
    /// 序列号与过站历史
    pub serial_repo: Arc<SerialRepository>,
    /// 工位锁
    pub station_lock_repo: Arc<StationLockRepository>,
    /// 打印记录
    pub print_log_repo: Arc<PrintLogRepository>,
    /// 操作日志
    pub action_log_repo: Arc<ActionLogRepository>,
    /// 测试台记录
    pub test_log_repo: Arc<TestLogRepository>,
}

impl MesRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            catalog_repo: Arc::new(CatalogRepository::new(conn.clone())),
            order_repo: Arc::new(OrderRepository::new(conn.clone())),
            serial_repo: Arc::new(SerialRepository::new(conn.clone())),
            station_lock_repo: Arc::new(StationLockRepository::new(conn.clone())),
            print_log_repo: Arc::new(PrintLogRepository::new(conn.clone())),
            action_log_repo: Arc::new(ActionLogRepository::new(conn.clone())),
            test_log_repo: Arc::new(TestLogRepository::new(conn)),
        }
    }
}

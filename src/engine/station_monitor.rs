// ==========================================
// 产线追溯系统 - 工位状态监控
// ==========================================
// 只读轮询，允许数据滞后
// 快照通过 watch 通道发布；所有接收端关闭后任务退出
// ==========================================

use crate::domain::station::StationStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::MesRepositories;
use crate::repository::error::RepositoryError;
use chrono::{Local, NaiveTime};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 读取一次全部工位状态
pub fn snapshot(repos: &MesRepositories) -> EngineResult<Vec<StationStatus>> {
    let operations = repos.catalog_repo.list_operations()?;
    let locks = repos.station_lock_repo.list()?;
    let since = Local::now().date_naive().and_time(NaiveTime::MIN);

    let mut statuses = Vec::with_capacity(operations.len());
    for op in operations {
        let lock = locks.iter().find(|l| l.operation_id == op.id);
        statuses.push(StationStatus {
            processed_today: repos.serial_repo.count_history_since(&op.id, &since)?,
            owner_id: lock.map(|l| l.owner_id.clone()),
            acquired_at: lock.map(|l| l.acquired_at),
            operation_id: op.id,
            operation_name: op.name,
        });
    }
    Ok(statuses)
}

/// 启动轮询任务
///
/// # 返回
/// - 快照接收端（初始为空列表）
/// - 任务句柄
pub fn spawn(
    repos: MesRepositories,
    poll_interval: Duration,
) -> (watch::Receiver<Vec<StationStatus>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(Vec::new());

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                tracing::debug!("工位监控无订阅者，退出");
                break;
            }

            let repos = repos.clone();
            let result = tokio::task::spawn_blocking(move || snapshot(&repos))
                .await
                .map_err(|e| EngineError::Repository(RepositoryError::InternalError(e.to_string())))
                .and_then(|r| r);

            match result {
                Ok(statuses) => {
                    if tx.send(statuses).is_err() {
                        break;
                    }
                }
                // 读取失败保留上一次快照
                Err(e) => tracing::warn!(error = %e, "工位状态读取失败"),
            }
        }
    });

    (rx, handle)
}

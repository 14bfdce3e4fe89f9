// ==========================================
// 产线追溯系统 - 主入口
// ==========================================
// 打开数据库、加载配置，运行工位状态监控直到收到退出信号
// ==========================================

use anyhow::Context;
use trace_mes::app::{get_default_db_path, AppState};
use trace_mes::engine::station_monitor;
use trace_mes::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", trace_mes::APP_NAME);
    tracing::info!("系统版本: {}", trace_mes::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    let (mut statuses, monitor) =
        station_monitor::spawn(state.repos.clone(), state.settings.monitor_poll_interval());

    loop {
        tokio::select! {
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
                for status in statuses.borrow_and_update().iter() {
                    tracing::info!(
                        station = %status.operation_name,
                        owner = status.owner_id.as_deref().unwrap_or("-"),
                        processed_today = status.processed_today,
                        "工位状态"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("无法监听退出信号")?;
                tracing::info!("收到退出信号");
                break;
            }
        }
    }

    drop(statuses);
    monitor.abort();
    Ok(())
}

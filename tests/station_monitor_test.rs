// ==========================================
// 工位状态监控测试
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod station_monitor_test {
    use std::time::Duration;

    use trace_mes::engine::station_monitor;

    use crate::test_helpers::*;

    #[test]
    fn test_snapshot_counts_today() {
        let env = TestEnv::new();
        let order_number = env.create_order("SAP-M", MODEL_LOT, 20, ROUTE_MAIN);
        env.trays
            .generate("TRAY-M", &order_number, OP_INITIAL, "op1", 6)
            .unwrap();
        env.locks.enter(OP_INITIAL, "op1").unwrap();

        let statuses = station_monitor::snapshot(&env.repos).unwrap();
        assert_eq!(statuses.len(), 5);

        let initial = statuses.iter().find(|s| s.operation_id == OP_INITIAL).unwrap();
        assert_eq!(initial.processed_today, 6);
        assert_eq!(initial.owner_id.as_deref(), Some("op1"));

        let pack = statuses.iter().find(|s| s.operation_id == OP_PACK).unwrap();
        assert_eq!(pack.processed_today, 0);
        assert!(pack.owner_id.is_none());
    }

    #[tokio::test]
    async fn test_monitor_publishes_and_stops() {
        let env = TestEnv::new();
        env.locks.enter(OP_TEST, "alice").unwrap();

        let (mut rx, handle) = station_monitor::spawn(env.repos.clone(), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("快照超时")
            .unwrap();
        let statuses = rx.borrow_and_update().clone();
        let test_station = statuses.iter().find(|s| s.operation_id == OP_TEST).unwrap();
        assert_eq!(test_station.owner_id.as_deref(), Some("alice"));

        // 接收端关闭后任务退出
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("监控任务未退出")
            .unwrap();
    }
}

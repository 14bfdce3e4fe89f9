// ==========================================
// 并发控制测试
// ==========================================
// 职责: 多终端（各自连接）同时操作时的互斥与数量上限
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_control_test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use trace_mes::config::MesSettings;
    use trace_mes::engine::{
        EngineError, MesRepositories, NoOpPrintDispatcher, OrderLifecycleEngine, PrintService,
        StationLockManager, TrayBatchEngine,
    };

    use crate::test_helpers::*;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 模拟一个独立终端
    struct Terminal {
        locks: StationLockManager,
        orders: OrderLifecycleEngine,
        trays: TrayBatchEngine,
    }

    impl Terminal {
        fn open(db_path: &str) -> Self {
            let repos = MesRepositories::from_connection(open_shared(db_path));
            let print = Arc::new(PrintService::new(
                Arc::new(NoOpPrintDispatcher),
                repos.print_log_repo.clone(),
            ));
            let settings = MesSettings::default();
            Self {
                locks: StationLockManager::new(
                    repos.station_lock_repo.clone(),
                    repos.catalog_repo.clone(),
                ),
                orders: OrderLifecycleEngine::new(repos.clone(), print.clone(), settings.clone()),
                trays: TrayBatchEngine::new(repos, print, settings),
            }
        }
    }

    /// 在 n 个线程中同时执行 f，返回各线程结果
    fn race<T, F>(db_path: &str, n: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(usize, &Terminal) -> T + Send + Sync + 'static,
    {
        let barrier = Arc::new(Barrier::new(n));
        let f = Arc::new(f);
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let barrier = barrier.clone();
                let f = f.clone();
                let db_path = db_path.to_string();
                thread::spawn(move || {
                    let terminal = Terminal::open(&db_path);
                    barrier.wait();
                    f(i, &terminal)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    // ==========================================
    // 测试1: 同一工位只有一个操作员
    // ==========================================

    #[test]
    fn test_concurrent_enter_single_winner() {
        let env = TestEnv::new();

        let results = race(&env.db_path, 8, |i, t| {
            t.locks.enter(OP_ASSEMBLE, &format!("user{}", i))
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "应该只有1个操作员占用成功");
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, EngineError::Conflict(_)), "失败应为冲突: {:?}", e);
            }
        }

        let holder = env.locks.state(OP_ASSEMBLE).unwrap();
        assert_eq!(holder.owner(), Some(winners[0].owner_id.as_str()));
    }

    // ==========================================
    // 测试2: 同一托盘不能同时属于两个工单
    // ==========================================

    #[test]
    fn test_concurrent_tray_generation_is_exclusive() {
        let env = TestEnv::new();
        let orders = Arc::new(vec![
            env.create_order("SAP-A", MODEL_LOT, 50, ROUTE_MAIN),
            env.create_order("SAP-B", MODEL_LOT, 50, ROUTE_MAIN),
        ]);

        let thread_orders = orders.clone();
        let results = race(&env.db_path, 2, move |i, t| {
            t.trays
                .generate("TRAY-X", &thread_orders[i], OP_INITIAL, "op", 10)
        });

        let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 1, "只有一个工单可以占用托盘");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(EngineError::Conflict(_)))));

        // 失败一方无残留
        let units = env.repos.serial_repo.list_by_tray("TRAY-X").unwrap();
        assert_eq!(units.len(), 10);
        assert!(units.iter().all(|u| u.order_number == ok[0].order_number));
    }

    // ==========================================
    // 测试3: 并发生成不超过工单数量
    // ==========================================

    #[test]
    fn test_concurrent_generation_respects_quantity() {
        let env = TestEnv::new();
        let order_number = Arc::new(env.create_order("SAP-Q", MODEL_LOT, 10, ROUTE_MAIN));

        let order = order_number.clone();
        let results = race(&env.db_path, 4, move |i, t| {
            t.trays
                .generate(&format!("TRAY-{}", i), &order, OP_INITIAL, "op", 5)
        });

        let generated: usize = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|g| g.serial_numbers.len())
            .sum();
        assert_eq!(generated, 10);
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, EngineError::OrderComplete { .. }), "{:?}", e);
            }
        }

        let units = env.repos.serial_repo.list_by_order(&order_number).unwrap();
        assert_eq!(units.len(), 10);
    }

    // ==========================================
    // 测试4: 同一序列号并发登记
    // ==========================================

    #[test]
    fn test_concurrent_registration_of_same_serial() {
        let env = TestEnv::new();
        let order_number = Arc::new(env.create_order("SAP-P", MODEL_PCB, 10, ROUTE_MAIN));

        let order = order_number.clone();
        let results = race(&env.db_path, 4, move |i, t| {
            t.orders
                .process_initial("AB0001", &order, OP_INITIAL, &format!("op{}", i))
        });

        let fresh = results
            .iter()
            .filter(|r| matches!(r, Ok(s) if !s.already_processed))
            .count();
        assert_eq!(fresh, 1, "只有一次登记生效");
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, EngineError::Conflict(_)), "{:?}", e);
            }
        }

        let units = env.repos.serial_repo.list_by_order(&order_number).unwrap();
        assert_eq!(units.len(), 1);
    }
}

// ==========================================
// 扫描上下文解析测试
// ==========================================
// 覆盖: SAP 工单号 / 托盘号解析、路线校验、API 层上下文扫描
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod context_resolver_test {
    use std::sync::Arc;

    use trace_mes::api::ApiError;
    use trace_mes::app::AppState;
    use trace_mes::domain::action_log::ActionType;
    use trace_mes::engine::{EngineError, RecordingPrintDispatcher};

    use crate::test_helpers::*;

    #[test]
    fn test_resolve_by_sap_order() {
        let env = TestEnv::new();
        let order_number = env.create_order("SAP-100", MODEL_LOT, 10, ROUTE_MAIN);

        let ctx = env.resolver.resolve("  SAP-100 ", ROUTE_MAIN).unwrap();
        assert_eq!(ctx.matched_by, "SAP_ORDER");
        assert_eq!(ctx.orders.len(), 1);
        assert_eq!(ctx.orders[0].order_number, order_number);
        assert_eq!(ctx.parts.len(), 1);
        assert_eq!(ctx.parts[0].id, "P-LOT");
    }

    #[test]
    fn test_resolve_by_tray() {
        let env = TestEnv::new();
        let order_number = env.create_order("SAP-200", MODEL_LOT, 20, ROUTE_MAIN);
        env.trays
            .generate("TRAY-7", &order_number, OP_INITIAL, "op1", 5)
            .unwrap();

        let ctx = env.resolver.resolve("TRAY-7", ROUTE_MAIN).unwrap();
        assert_eq!(ctx.matched_by, "TRAY");
        assert_eq!(ctx.orders.len(), 1);
        assert_eq!(ctx.orders[0].sap_order_number, "SAP-200");
    }

    #[test]
    fn test_tray_of_closed_order_resolves_to_nothing() {
        let env = TestEnv::new();
        let order_number = env.create_order("SAP-300", MODEL_LOT, 5, ROUTE_MAIN);
        env.trays
            .generate("TRAY-8", &order_number, OP_INITIAL, "op1", 5)
            .unwrap();
        assert!(env.orders.close_order(&order_number).unwrap());

        assert!(matches!(
            env.resolver.resolve("TRAY-8", ROUTE_MAIN),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_and_empty_token() {
        let env = TestEnv::new();
        assert!(matches!(
            env.resolver.resolve("NOPE", ROUTE_MAIN),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            env.resolver.resolve("   ", ROUTE_MAIN),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_part_outside_active_route() {
        let env = TestEnv::new();
        env.create_order("SAP-400", MODEL_SHORT, 10, ROUTE_SHORT);

        match env.resolver.resolve("SAP-400", ROUTE_MAIN) {
            Err(EngineError::RouteMismatch {
                product_code,
                route_id,
            }) => {
                assert_eq!(product_code, MODEL_SHORT);
                assert_eq!(route_id, ROUTE_MAIN);
            }
            other => panic!("Expected RouteMismatch, got {:?}", other),
        }
        assert!(env.resolver.resolve("SAP-400", ROUTE_SHORT).is_ok());
    }

    // ==========================================
    // API 层
    // ==========================================

    /// 与 TestEnv 共享同一数据库文件（目录已写入）
    fn app_state(env: &TestEnv) -> AppState {
        AppState::with_dispatcher(
            env.db_path.clone(),
            Arc::new(RecordingPrintDispatcher::new()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_scan_initial_in_context() {
        let env = TestEnv::new();
        let state = app_state(&env);

        let created = state
            .order_api
            .create_order("SAP-500", MODEL_PCB, 3, ROUTE_MAIN, "planner")
            .unwrap();

        let result = state
            .production_api
            .scan_initial_in_context("AB1234", "SAP-500", ROUTE_MAIN, OP_INITIAL, "op1")
            .unwrap();
        assert_eq!(result.serial_number, "AB1234");
        assert_eq!(result.order_number, created.order.order_number);

        // 掩码不匹配
        assert!(matches!(
            state
                .production_api
                .scan_initial_in_context("XY1234", "SAP-500", ROUTE_MAIN, OP_INITIAL, "op1"),
            Err(ApiError::ValidationError(_))
        ));

        let actions = state
            .order_api
            .order_actions(&created.order.order_number)
            .unwrap();
        assert!(actions
            .iter()
            .any(|a| a.action_type == ActionType::CreateOrder.as_str()));
    }

    #[test]
    fn test_api_rejects_blank_input() {
        let env = TestEnv::new();
        let state = app_state(&env);

        assert!(matches!(
            state.production_api.scan_initial(" ", "X", OP_INITIAL, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.production_api.resolve_scan("", ROUTE_MAIN),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_force_unlock_is_audited() {
        let env = TestEnv::new();
        let state = app_state(&env);

        state.station_api.enter_station(OP_TEST, "alice").unwrap();
        assert!(matches!(
            state.station_api.force_unlock(OP_TEST, "boss", " "),
            Err(ApiError::InvalidInput(_))
        ));

        let previous = state
            .station_api
            .force_unlock(OP_TEST, "boss", "交班未退出")
            .unwrap()
            .unwrap();
        assert_eq!(previous.owner_id, "alice");

        let logs = state.repos.action_log_repo.find_by_target(OP_TEST).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActionType::ForceUnlock.as_str());
        assert_eq!(logs[0].actor, "boss");
    }

    #[test]
    fn test_station_statuses_show_holder() {
        let env = TestEnv::new();
        let state = app_state(&env);

        state.station_api.enter_station(OP_ASSEMBLE, "alice").unwrap();
        let statuses = state.station_api.station_statuses().unwrap();
        let assemble = statuses
            .iter()
            .find(|s| s.operation_id == OP_ASSEMBLE)
            .unwrap();
        assert_eq!(assemble.owner_id.as_deref(), Some("alice"));
        assert!(assemble.acquired_at.is_some());
    }
}

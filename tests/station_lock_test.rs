// ==========================================
// 工位锁测试
// ==========================================
// 职责: 验证 FREE / HELD 状态转换与作用域释放
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod station_lock_test {
    use trace_mes::domain::station::StationState;
    use trace_mes::engine::EngineError;

    use crate::test_helpers::*;

    #[test]
    fn test_second_operator_is_rejected() {
        let env = TestEnv::new();

        env.locks.enter(OP_ASSEMBLE, "alice").unwrap();
        match env.locks.enter(OP_ASSEMBLE, "bob") {
            Err(EngineError::Conflict(msg)) => assert!(msg.contains("alice")),
            other => panic!("Expected Conflict, got {:?}", other),
        }

        // 非持有人离开无变化
        assert!(!env.locks.exit(OP_ASSEMBLE, "bob").unwrap());
        assert_eq!(
            env.locks.state(OP_ASSEMBLE).unwrap(),
            StationState::Held {
                owner_id: "alice".to_string()
            }
        );

        assert!(env.locks.exit(OP_ASSEMBLE, "alice").unwrap());
        assert_eq!(env.locks.state(OP_ASSEMBLE).unwrap(), StationState::Free);
        env.locks.enter(OP_ASSEMBLE, "bob").unwrap();
    }

    #[test]
    fn test_reentry_by_owner_keeps_lock() {
        let env = TestEnv::new();

        let first = env.locks.enter(OP_TEST, "alice").unwrap();
        let second = env.locks.enter(OP_TEST, "alice").unwrap();
        assert_eq!(first.acquired_at, second.acquired_at);
        assert_eq!(second.owner_id, "alice");
    }

    #[test]
    fn test_force_unlock_from_any_state() {
        let env = TestEnv::new();

        assert!(env.locks.force_unlock(OP_PACK).unwrap().is_none());

        env.locks.enter(OP_PACK, "alice").unwrap();
        let previous = env.locks.force_unlock(OP_PACK).unwrap().unwrap();
        assert_eq!(previous.owner_id, "alice");
        assert_eq!(env.locks.state(OP_PACK).unwrap(), StationState::Free);
    }

    #[test]
    fn test_session_releases_on_every_exit_path() {
        let env = TestEnv::new();

        {
            let session = env.locks.session(OP_INITIAL, "alice").unwrap();
            assert_eq!(session.user_id(), "alice");
            assert!(env.locks.enter(OP_INITIAL, "bob").is_err());
        }
        assert_eq!(env.locks.state(OP_INITIAL).unwrap(), StationState::Free);

        // 提前返回的路径
        let run = |fail: bool| -> Result<(), EngineError> {
            let _session = env.locks.session(OP_INITIAL, "carol")?;
            if fail {
                return Err(EngineError::Validation("中途失败".to_string()));
            }
            Ok(())
        };
        assert!(run(true).is_err());
        assert_eq!(env.locks.state(OP_INITIAL).unwrap(), StationState::Free);

        let session = env.locks.session(OP_INITIAL, "dave").unwrap();
        assert!(session.release().unwrap());
        assert_eq!(env.locks.state(OP_INITIAL).unwrap(), StationState::Free);
    }

    #[test]
    fn test_session_denied_does_not_touch_holder() {
        let env = TestEnv::new();
        env.locks.enter(OP_ASSEMBLE, "alice").unwrap();

        assert!(env.locks.session(OP_ASSEMBLE, "bob").is_err());
        assert_eq!(
            env.locks.state(OP_ASSEMBLE).unwrap().owner(),
            Some("alice")
        );
    }

    #[test]
    fn test_unknown_operation() {
        let env = TestEnv::new();
        assert!(matches!(
            env.locks.enter("OP99", "alice"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_operation_list_shows_active_operator() {
        let env = TestEnv::new();
        env.locks.enter(OP_TEST, "alice").unwrap();

        let ops = env.repos.catalog_repo.list_operations().unwrap();
        let test_op = ops.iter().find(|o| o.id == OP_TEST).unwrap();
        assert_eq!(test_op.active_operator_id.as_deref(), Some("alice"));
        let pack = ops.iter().find(|o| o.id == OP_PACK).unwrap();
        assert!(pack.active_operator_id.is_none());
    }
}

// ==========================================
// 配置管理 API 测试
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod config_api_test {
    use trace_mes::api::ApiError;
    use trace_mes::app::AppState;
    use trace_mes::config::config_keys;
    use trace_mes::domain::action_log::ActionType;

    use crate::test_helpers::create_test_db;

    #[test]
    fn test_update_config_is_audited_and_effective() {
        let (_temp, db_path) = create_test_db().unwrap();
        let state = AppState::new(db_path.clone()).unwrap();

        assert_eq!(state.config_api.effective_settings().unwrap().tray_max_units, 100);
        assert!(state.config_api.list_configs().unwrap().is_empty());

        state
            .config_api
            .update_config(config_keys::TRAY_MAX_UNITS, " 60 ", "boss", "新托盘规格")
            .unwrap();

        let configs = state.config_api.list_configs().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].value, "60");
        assert_eq!(state.config_api.effective_settings().unwrap().tray_max_units, 60);

        let logs = state
            .repos
            .action_log_repo
            .find_by_target(config_keys::TRAY_MAX_UNITS)
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActionType::UpdateConfig.as_str());
        assert_eq!(logs[0].payload_json.as_ref().unwrap()["new_value"], "60");

        // 重新启动后加载新值
        drop(state);
        let reopened = AppState::new(db_path).unwrap();
        assert_eq!(reopened.settings.tray_max_units, 60);
    }

    #[test]
    fn test_update_config_rejects_bad_input() {
        let (_temp, db_path) = create_test_db().unwrap();
        let state = AppState::new(db_path).unwrap();

        assert!(matches!(
            state
                .config_api
                .update_config(config_keys::SERIAL_SUFFIX, "Z", "boss", ""),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(state
            .config_api
            .update_config("tray.colour", "blue", "boss", "试验")
            .is_err());

        // 托盘容量不得超过物理上限，后缀必须是字母
        for (key, value) in [
            (config_keys::TRAY_MAX_UNITS, "500"),
            (config_keys::SERIAL_SUFFIX, "7"),
        ] {
            assert!(matches!(
                state.config_api.update_config(key, value, "boss", "试验"),
                Err(ApiError::ValidationError(_))
            ));
        }
        let settings = state.config_api.effective_settings().unwrap();
        assert_eq!(settings.tray_max_units, 100);
        assert_eq!(settings.serial_suffix, 'M');
        assert!(state.repos.action_log_repo.find_recent(10).unwrap().is_empty());
    }
}

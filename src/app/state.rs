// ==========================================
// 产线追溯系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::{CatalogApi, ConfigApi, OrderApi, ProductionApi, StationApi};
use crate::config::config_manager::{ConfigManager, MesSettings};
use crate::db::open_and_init;
use crate::engine::{
    ContextResolver, MesRepositories, NoOpPrintDispatcher, OrderLifecycleEngine, PrintDispatcher,
    PrintService, StationLockManager, TrayBatchEngine,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的运行配置
    pub settings: MesSettings,

    /// 仓储集合（监控任务使用）
    pub repos: MesRepositories,

    /// 工位API
    pub station_api: Arc<StationApi>,

    /// 工单管理API
    pub order_api: Arc<OrderApi>,

    /// 生产操作API
    pub production_api: Arc<ProductionApi>,

    /// 目录维护API
    pub catalog_api: Arc<CatalogApi>,

    /// 配置管理API
    pub config_api: Arc<ConfigApi>,
}

impl AppState {
    /// 创建新的AppState实例（不连接打印机）
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_dispatcher(db_path, Arc::new(NoOpPrintDispatcher), get_manifest_dir())
    }

    /// 创建AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - dispatcher: 打印派发器
    /// - manifest_dir: 托盘清单导出目录
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并建表
    /// 2. 加载运行配置
    /// 3. 初始化所有Repository与Engine
    /// 4. 创建所有API实例
    pub fn with_dispatcher(
        db_path: String,
        dispatcher: Arc<dyn PrintDispatcher>,
        manifest_dir: Option<PathBuf>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_and_init(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = config_manager
            .load_settings()
            .map_err(|e| format!("无法加载运行配置: {}", e))?;
        tracing::info!(?settings, "运行配置已加载");

        // ==========================================
        // Repository / Engine
        // ==========================================
        let repos = MesRepositories::from_connection(conn);
        let print = Arc::new(PrintService::new(dispatcher, repos.print_log_repo.clone()));

        let lock_manager = Arc::new(StationLockManager::new(
            repos.station_lock_repo.clone(),
            repos.catalog_repo.clone(),
        ));
        let order_engine = Arc::new(OrderLifecycleEngine::new(
            repos.clone(),
            print.clone(),
            settings.clone(),
        ));
        let tray_engine = Arc::new(TrayBatchEngine::new(repos.clone(), print, settings.clone()));
        let resolver = Arc::new(ContextResolver::new(repos.clone()));

        // ==========================================
        // API
        // ==========================================
        let station_api = Arc::new(StationApi::new(lock_manager, repos.clone()));
        let order_api = Arc::new(OrderApi::new(
            order_engine.clone(),
            repos.action_log_repo.clone(),
        ));
        let production_api = Arc::new(ProductionApi::new(
            order_engine,
            tray_engine,
            resolver,
            manifest_dir,
        ));
        let catalog_api = Arc::new(CatalogApi::new(
            repos.catalog_repo.clone(),
            repos.action_log_repo.clone(),
        ));
        let config_api = Arc::new(ConfigApi::new(
            config_manager,
            repos.action_log_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            settings,
            repos,
            station_api,
            order_api,
            production_api,
            catalog_api,
            config_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 顺序: TRACE_MES_DB_PATH → 用户数据目录 → ./trace_mes.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("TRACE_MES_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./trace_mes.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("trace-mes");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("trace_mes.db");
        }
    }

    path.to_string_lossy().to_string()
}

/// 托盘清单导出目录（TRACE_MES_MANIFEST_DIR，未设置则不导出）
pub fn get_manifest_dir() -> Option<PathBuf> {
    std::env::var("TRACE_MES_MANIFEST_DIR")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、参考目录数据、引擎装配
// 目录:
// - R1: Initial(10) → Assemble(20) → Test(30) → Pack(40, 最终)
// - R2: Initial(10) → Pack(20)
// - R3: Flash(10, 需测试记录) → Pack(20)
// ==========================================
#![allow(dead_code)]

use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

use trace_mes::config::MesSettings;
use trace_mes::db::{open_and_init, open_sqlite_connection};
use trace_mes::domain::catalog::{Operation, PartNumber, ProcessRoute, RouteStep};
use trace_mes::domain::types::SerialGenType;
use trace_mes::engine::{
    ContextResolver, MesRepositories, OrderLifecycleEngine, PrintService,
    RecordingPrintDispatcher, StationLockManager, TrayBatchEngine,
};

pub const OP_INITIAL: &str = "OP10";
pub const OP_ASSEMBLE: &str = "OP20";
pub const OP_TEST: &str = "OP30";
pub const OP_PACK: &str = "OP40";
pub const OP_FLASH: &str = "OP05";

pub const ROUTE_MAIN: &str = "R1";
pub const ROUTE_SHORT: &str = "R2";
pub const ROUTE_FLASH: &str = "R3";

/// LOT_BASED，掩码 ###
pub const MODEL_LOT: &str = "MODEL-L";
/// PCB_SERIAL，掩码 AB####
pub const MODEL_PCB: &str = "MODEL-P";
/// ACCESSORIES，掩码 ###
pub const MODEL_ACC: &str = "MODEL-A";
/// LOT_BASED，属于 R2
pub const MODEL_SHORT: &str = "MODEL-S";
/// PCB_SERIAL，掩码 TT####，属于 R3
pub const MODEL_FLASH: &str = "MODEL-T";
/// 无工艺路线
pub const MODEL_NO_ROUTE: &str = "MODEL-N";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();
    open_and_init(&db_path)?;
    Ok((temp_file, db_path))
}

/// 打开一个新连接（模拟另一个终端）
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

// ==========================================
// 目录数据
// ==========================================

pub fn route(id: &str, steps: &[(&str, i32)]) -> ProcessRoute {
    ProcessRoute {
        id: id.to_string(),
        name: format!("Route {}", id),
        description: None,
        steps: steps
            .iter()
            .map(|(op, order)| RouteStep {
                operation_id: op.to_string(),
                step_order: *order,
            })
            .collect(),
    }
}

pub fn part(id: &str, product_code: &str, mask: &str, gen: SerialGenType, route_id: Option<&str>) -> PartNumber {
    PartNumber {
        id: id.to_string(),
        part_number: format!("PN-{}", id),
        revision: Some("A".to_string()),
        description: None,
        product_code: product_code.to_string(),
        serial_mask: mask.to_string(),
        serial_gen_type: gen,
        process_route_id: route_id.map(|s| s.to_string()),
    }
}

/// 写入参考目录
pub fn seed_catalog(repos: &MesRepositories) {
    let catalog = &repos.catalog_repo;
    for op in [
        Operation::new(OP_FLASH, "Flash", 5).initial().with_test_log(),
        Operation::new(OP_INITIAL, "Initial", 10).initial(),
        Operation::new(OP_ASSEMBLE, "Assemble", 20),
        Operation::new(OP_TEST, "Test", 30),
        Operation::new(OP_PACK, "Pack", 40).final_step(),
    ] {
        catalog.upsert_operation(&op).unwrap();
    }

    catalog
        .save_route(&route(
            ROUTE_MAIN,
            &[(OP_INITIAL, 10), (OP_ASSEMBLE, 20), (OP_TEST, 30), (OP_PACK, 40)],
        ))
        .unwrap();
    catalog
        .save_route(&route(ROUTE_SHORT, &[(OP_INITIAL, 10), (OP_PACK, 20)]))
        .unwrap();
    catalog
        .save_route(&route(ROUTE_FLASH, &[(OP_FLASH, 10), (OP_PACK, 20)]))
        .unwrap();

    for p in [
        part("P-LOT", MODEL_LOT, "###", SerialGenType::LotBased, Some(ROUTE_MAIN)),
        part("P-PCB", MODEL_PCB, "AB####", SerialGenType::PcbSerial, Some(ROUTE_MAIN)),
        part("P-ACC", MODEL_ACC, "###", SerialGenType::Accessories, Some(ROUTE_MAIN)),
        part("P-SHORT", MODEL_SHORT, "###", SerialGenType::LotBased, Some(ROUTE_SHORT)),
        part("P-FLASH", MODEL_FLASH, "TT####", SerialGenType::PcbSerial, Some(ROUTE_FLASH)),
        part("P-NONE", MODEL_NO_ROUTE, "###", SerialGenType::LotBased, None),
    ] {
        catalog.upsert_part(&p).unwrap();
    }
}

// ==========================================
// 引擎装配
// ==========================================

pub struct TestEnv {
    pub _temp: NamedTempFile,
    pub db_path: String,
    pub repos: MesRepositories,
    pub dispatcher: Arc<RecordingPrintDispatcher>,
    pub settings: MesSettings,
    pub orders: OrderLifecycleEngine,
    pub trays: TrayBatchEngine,
    pub locks: StationLockManager,
    pub resolver: ContextResolver,
}

impl TestEnv {
    pub fn new() -> Self {
        trace_mes::logging::init_test();
        let (temp, db_path) = create_test_db().unwrap();
        let repos = MesRepositories::from_connection(open_shared(&db_path));
        seed_catalog(&repos);

        let dispatcher = Arc::new(RecordingPrintDispatcher::new());
        let print = Arc::new(PrintService::new(
            dispatcher.clone(),
            repos.print_log_repo.clone(),
        ));
        let settings = MesSettings::default();

        Self {
            orders: OrderLifecycleEngine::new(repos.clone(), print.clone(), settings.clone()),
            trays: TrayBatchEngine::new(repos.clone(), print, settings.clone()),
            locks: StationLockManager::new(
                repos.station_lock_repo.clone(),
                repos.catalog_repo.clone(),
            ),
            resolver: ContextResolver::new(repos.clone()),
            _temp: temp,
            db_path,
            repos,
            dispatcher,
            settings,
        }
    }

    /// 创建工单并返回内部批次号
    pub fn create_order(&self, sap: &str, product_code: &str, quantity: i64, route_id: &str) -> String {
        self.orders
            .create_order(sap, product_code, quantity, route_id)
            .unwrap()
            .order
            .order_number
    }
}

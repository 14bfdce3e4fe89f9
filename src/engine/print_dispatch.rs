// ==========================================
// 产线追溯系统 - 打印派发
// ==========================================
// 职责: 定义打印机适配 trait，记录打印结果
// 红线: 打印失败只降级为提示，不阻塞也不回滚业务操作
// 说明: Engine 层定义 trait，由部署方提供真实打印机适配器
// ==========================================

use crate::domain::catalog::PartNumber;
use crate::domain::print::{PrintJob, PrintStatusReport};
use crate::domain::types::{LabelType, PrintStatus};
use crate::repository::PrintLogRepository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ==========================================
// 打印错误（瞬时错误，只作提示）
// ==========================================
#[derive(Error, Debug, Clone)]
pub enum PrintError {
    #[error("打印机不可用: {0}")]
    Unavailable(String),

    #[error("打印失败: {0}")]
    Failed(String),
}

// ==========================================
// 打印派发 Trait
// ==========================================

/// 打印机适配器
///
/// # 实现说明
/// - 只负责把任务交给打印机，不做重试
/// - 返回 Err 时调用方记录失败并继续
pub trait PrintDispatcher: Send + Sync {
    fn dispatch(&self, job: &PrintJob) -> Result<(), PrintError>;
}

/// 空操作打印派发器
///
/// 用于未接入打印机的场景
#[derive(Debug, Clone, Default)]
pub struct NoOpPrintDispatcher;

impl PrintDispatcher for NoOpPrintDispatcher {
    fn dispatch(&self, job: &PrintJob) -> Result<(), PrintError> {
        tracing::debug!(
            "NoOpPrintDispatcher: 跳过打印 - target={}, labels={}",
            job.target_identifier,
            job.label_summary()
        );
        Ok(())
    }
}

/// 记录型打印派发器（测试与联调用）
#[derive(Debug, Default)]
pub struct RecordingPrintDispatcher {
    jobs: Mutex<Vec<PrintJob>>,
    failing: AtomicBool,
}

impl RecordingPrintDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟打印机故障
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<PrintJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

impl PrintDispatcher for RecordingPrintDispatcher {
    fn dispatch(&self, job: &PrintJob) -> Result<(), PrintError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PrintError::Unavailable("模拟打印机离线".to_string()));
        }
        self.jobs
            .lock()
            .map_err(|e| PrintError::Failed(e.to_string()))?
            .push(job.clone());
        Ok(())
    }
}

// ==========================================
// PrintService - 派发 + 记录
// ==========================================
pub struct PrintService {
    dispatcher: Arc<dyn PrintDispatcher>,
    print_log_repo: Arc<PrintLogRepository>,
}

impl PrintService {
    pub fn new(dispatcher: Arc<dyn PrintDispatcher>, print_log_repo: Arc<PrintLogRepository>) -> Self {
        Self {
            dispatcher,
            print_log_repo,
        }
    }

    /// 派发打印任务并写入打印记录
    ///
    /// 多件任务按序列号逐行记录；记录失败只写日志。
    pub fn dispatch(&self, job: PrintJob) -> PrintStatusReport {
        let identifiers = if job.serial_numbers.is_empty() {
            vec![job.target_identifier.clone()]
        } else {
            job.serial_numbers.clone()
        };
        let summary = job.label_summary();

        let (status, message, report) = match self.dispatcher.dispatch(&job) {
            Ok(()) => {
                tracing::info!(
                    target_id = %job.target_identifier,
                    labels = %summary,
                    quantity = job.quantity,
                    "打印任务已派发"
                );
                (PrintStatus::Success, "已打印".to_string(), PrintStatusReport::Printed)
            }
            Err(e) => {
                tracing::warn!(
                    target_id = %job.target_identifier,
                    error = %e,
                    "打印失败，业务操作继续"
                );
                let msg = e.to_string();
                (PrintStatus::Error, msg.clone(), PrintStatusReport::Warning(msg))
            }
        };

        if let Err(e) = self.print_log_repo.record(
            &identifiers,
            status,
            &message,
            Some(&summary),
            Some(&job.job_id),
        ) {
            tracing::warn!(job_id = %job.job_id, error = %e, "打印记录写入失败");
        }

        report
    }
}

// ==========================================
// 标签任务模板
// ==========================================
pub mod label_jobs {
    use super::*;

    fn base(target: &str, part: &PartNumber) -> PrintJob {
        PrintJob::new(target, &part.part_number, &part.sku())
    }

    /// 初始工位单件登记（铭牌与箱标除外）
    pub fn initial_unit(serial_number: &str, part: &PartNumber) -> PrintJob {
        base(serial_number, part).excluding(&[LabelType::Nameplate, LabelType::BoxLabel])
    }

    /// 最终工位单件完工（外箱标签除外）
    pub fn final_unit(serial_number: &str, part: &PartNumber) -> PrintJob {
        base(serial_number, part).excluding(&[LabelType::Carton1, LabelType::Carton2])
    }

    /// 托盘完工（只打铭牌，每件一张）
    pub fn tray_nameplates(tray_id: &str, part: &PartNumber, serials: Vec<String>) -> PrintJob {
        let qty = serials.len() as i64;
        base(tray_id, part)
            .excluding(&[LabelType::Carton1, LabelType::Carton2, LabelType::BoxLabel])
            .with_quantity(qty)
            .with_serials(serials)
    }

    /// 附件工单创建（按工单数量整单打印）
    pub fn order_setup(order_number: &str, part: &PartNumber, quantity: i64) -> PrintJob {
        base(order_number, part).with_quantity(quantity)
    }

    /// 工单补打（铭牌除外）
    pub fn order_reprint(order_number: &str, part: &PartNumber, quantity: i64) -> PrintJob {
        base(order_number, part)
            .excluding(&[LabelType::Nameplate])
            .with_quantity(quantity)
    }

    /// 单件补打（外箱标签除外）
    pub fn unit_reprint(serial_number: &str, part: &PartNumber) -> PrintJob {
        base(serial_number, part).excluding(&[LabelType::Carton1, LabelType::Carton2])
    }

    /// 箱标
    pub fn box_label(target: &str, part: &PartNumber, quantity: i64) -> PrintJob {
        base(target, part)
            .excluding(&[LabelType::Nameplate, LabelType::Carton1, LabelType::Carton2])
            .with_quantity(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::types::SerialGenType;
    use rusqlite::Connection;

    fn part() -> PartNumber {
        PartNumber {
            id: "P1".to_string(),
            part_number: "100-200".to_string(),
            revision: None,
            description: None,
            product_code: "MODEL-X".to_string(),
            serial_mask: "###".to_string(),
            serial_gen_type: SerialGenType::LotBased,
            process_route_id: None,
        }
    }

    fn service(dispatcher: Arc<RecordingPrintDispatcher>) -> (PrintService, Arc<PrintLogRepository>) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        let repo = Arc::new(PrintLogRepository::new(Arc::new(Mutex::new(conn))));
        (PrintService::new(dispatcher, repo.clone()), repo)
    }

    #[test]
    fn test_failure_is_downgraded_and_logged() {
        let dispatcher = Arc::new(RecordingPrintDispatcher::new());
        dispatcher.set_failing(true);
        let (svc, repo) = service(dispatcher.clone());

        let report = svc.dispatch(label_jobs::unit_reprint("S1", &part()));
        assert!(report.is_warning());
        assert!(dispatcher.jobs().is_empty());

        let log = repo.find_by_identifier("S1").unwrap();
        assert_eq!(log[0].status, PrintStatus::Error);
    }

    #[test]
    fn test_tray_job_logs_each_serial() {
        let dispatcher = Arc::new(RecordingPrintDispatcher::new());
        let (svc, repo) = service(dispatcher.clone());

        let serials = vec!["S1".to_string(), "S2".to_string()];
        let job = label_jobs::tray_nameplates("T1", &part(), serials);
        let job_id = job.job_id.clone();
        assert_eq!(svc.dispatch(job), PrintStatusReport::Printed);

        let jobs = dispatcher.jobs();
        assert_eq!(jobs[0].quantity, 2);
        assert_eq!(jobs[0].label_summary(), "NAMEPLATE");
        assert_eq!(repo.find_by_job(&job_id).unwrap().len(), 2);
    }
}

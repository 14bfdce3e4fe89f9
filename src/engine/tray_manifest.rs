// ==========================================
// 产线追溯系统 - 托盘清单导出
// ==========================================
// 文件名: {SAP工单号}_TRAY_{托盘号}_{批次号}.csv
// 列: PN, SKU, SERIAL
// ==========================================

use crate::domain::catalog::PartNumber;
use crate::engine::error::{EngineError, EngineResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
struct ManifestRow<'a> {
    #[serde(rename = "PN")]
    pn: &'a str,
    #[serde(rename = "SKU")]
    sku: &'a str,
    #[serde(rename = "SERIAL")]
    serial: &'a str,
}

/// 托盘清单
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayManifest {
    pub sap_order_number: String,
    pub tray_id: String,
    pub order_number: String,
    pub part_number: String,
    pub sku: String,
    pub serial_numbers: Vec<String>,
}

impl TrayManifest {
    pub fn new(
        sap_order_number: &str,
        tray_id: &str,
        order_number: &str,
        part: &PartNumber,
        serial_numbers: Vec<String>,
    ) -> Self {
        Self {
            sap_order_number: sap_order_number.to_string(),
            tray_id: tray_id.to_string(),
            order_number: order_number.to_string(),
            part_number: part.part_number.clone(),
            sku: part.sku(),
            serial_numbers,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_TRAY_{}_{}.csv",
            sanitize(&self.sap_order_number),
            sanitize(&self.tray_id),
            sanitize(&self.order_number)
        )
    }

    pub fn to_csv_bytes(&self) -> EngineResult<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(Vec::new());

        for serial in &self.serial_numbers {
            writer
                .serialize(ManifestRow {
                    pn: &self.part_number,
                    sku: &self.sku,
                    serial,
                })
                .map_err(|e| EngineError::Export(e.to_string()))?;
        }
        // 空清单也输出表头
        if self.serial_numbers.is_empty() {
            writer
                .write_record(["PN", "SKU", "SERIAL"])
                .map_err(|e| EngineError::Export(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| EngineError::Export(e.to_string()))
    }

    /// 写入目录，返回文件路径
    pub fn write_to_dir(&self, dir: &Path) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::Export(e.to_string()))?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_csv_bytes()?)
            .map_err(|e| EngineError::Export(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), rows = self.serial_numbers.len(), "托盘清单已写入");
        Ok(path)
    }
}

// 文件名中不允许的字符替换为下划线
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SerialGenType;

    fn part() -> PartNumber {
        PartNumber {
            id: "P1".to_string(),
            part_number: "PN-100".to_string(),
            revision: Some("B".to_string()),
            description: None,
            product_code: "MODEL-X".to_string(),
            serial_mask: "###".to_string(),
            serial_gen_type: SerialGenType::LotBased,
            process_route_id: Some("R".to_string()),
        }
    }

    #[test]
    fn test_manifest_file_name_and_rows() {
        let manifest = TrayManifest::new(
            "SAP/42",
            "T1",
            "KA001",
            &part(),
            vec!["KA001-001M".to_string(), "KA001-002M".to_string()],
        );
        assert_eq!(manifest.file_name(), "SAP_42_TRAY_T1_KA001.csv");

        let text = String::from_utf8(manifest.to_csv_bytes().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "PN,SKU,SERIAL");
        assert_eq!(lines[1], "PN-100,PN-100-B,KA001-001M");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = TrayManifest::new("S1", "T9", "KA003", &part(), vec!["KA003-001M".into()]);
        let path = manifest.write_to_dir(dir.path()).unwrap();
        assert!(path.ends_with("S1_TRAY_T9_KA003.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("KA003-001M"));
    }
}

// ==========================================
// 产线追溯系统 - 批次号规则
// ==========================================
// 批次号 = 年份码 + 季度码(A–D) + 3 位流水号
// 年份码 = 基准字母 + (年份 - 基准年)，偏移超出 0..=15 或越过 'Z' 时为 "AA"
// 流水号在写事务内分配（见 OrderRepository::create_with_lot_number）
// ==========================================

use crate::config::MesSettings;
use chrono::{Datelike, NaiveDate};

/// 年份码最大偏移
const MAX_YEAR_OFFSET: i32 = 15;

/// 超出范围时的年份码
const OUT_OF_RANGE_YEAR_CODE: &str = "AA";

pub fn year_code(year: i32, base_year: i32, base_char: char) -> String {
    let offset = year - base_year;
    if !(0..=MAX_YEAR_OFFSET).contains(&offset) || !base_char.is_ascii_uppercase() {
        return OUT_OF_RANGE_YEAR_CODE.to_string();
    }

    let code = base_char as u32 + offset as u32;
    match char::from_u32(code) {
        Some(c) if c.is_ascii_uppercase() => c.to_string(),
        _ => OUT_OF_RANGE_YEAR_CODE.to_string(),
    }
}

/// 季度码: 1–3 月 A，4–6 月 B，7–9 月 C，10–12 月 D
pub fn quarter_code(month: u32) -> char {
    match month {
        1..=3 => 'A',
        4..=6 => 'B',
        7..=9 => 'C',
        _ => 'D',
    }
}

/// 批次号前缀（年份码 + 季度码）
pub fn lot_prefix(date: NaiveDate, settings: &MesSettings) -> String {
    format!(
        "{}{}",
        year_code(date.year(), settings.lot_base_year, settings.lot_base_char),
        quarter_code(date.month())
    )
}

/// 解析批次号中的流水号
pub fn sequence_of(order_number: &str, prefix: &str) -> Option<u32> {
    order_number
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse().ok())
}

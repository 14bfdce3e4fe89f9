// ==========================================
// 产线追溯系统 - 序列号掩码
// ==========================================
// 掩码: `#` = 一位数字，其余字符按字面匹配
// 扫描值可带一个结尾字母（如 "M"），匹配前剥离
// 生成序列号: {批次号}-{主体}{后缀}，主体 = 掩码按流水号右对齐填充
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct SerialMask {
    mask: String,
    pattern: Regex,
}

impl SerialMask {
    /// 解析掩码
    pub fn parse(mask: &str) -> EngineResult<Self> {
        let mask = mask.trim();
        if mask.is_empty() {
            return Err(EngineError::Validation("序列号掩码为空".to_string()));
        }

        let mut expr = String::from("^");
        for ch in mask.chars() {
            if ch == '#' {
                expr.push_str(r"\d");
            } else {
                expr.push_str(&regex::escape(&ch.to_string()));
            }
        }
        expr.push('$');

        let pattern = Regex::new(&expr)
            .map_err(|e| EngineError::Validation(format!("序列号掩码无效 {}: {}", mask, e)))?;
        Ok(Self {
            mask: mask.to_string(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.mask
    }

    /// 掩码中数字位的个数
    pub fn digit_slots(&self) -> usize {
        self.mask.chars().filter(|c| *c == '#').count()
    }

    /// 主体是否匹配（原值或剥离结尾字母后匹配均可）
    pub fn matches(&self, scanned: &str) -> bool {
        self.normalize(scanned).is_some()
    }

    /// 返回与掩码匹配的形式（原值优先，其次为剥离结尾字母后的值）
    pub fn normalize<'a>(&self, scanned: &'a str) -> Option<&'a str> {
        let scanned = scanned.trim();
        if self.pattern.is_match(scanned) {
            return Some(scanned);
        }
        let stripped = strip_suffix(scanned);
        if stripped.len() != scanned.len() && self.pattern.is_match(stripped) {
            Some(stripped)
        } else {
            None
        }
    }

    /// 生成的序列号主体是否匹配掩码
    pub fn matches_generated(&self, order_number: &str, serial_number: &str) -> bool {
        serial_number
            .strip_prefix(order_number)
            .and_then(|rest| rest.strip_prefix('-'))
            .map(|body| self.matches(body))
            .unwrap_or(false)
    }

    /// 按流水号填充掩码
    ///
    /// # 返回
    /// - `Err(Validation)`: 流水号超出掩码数字位
    pub fn fill(&self, seq: i64) -> EngineResult<String> {
        let slots = self.digit_slots();
        let digits = format!("{:0width$}", seq, width = slots);
        if seq < 0 || digits.len() > slots {
            return Err(EngineError::Validation(format!(
                "流水号 {} 超出序列号掩码 {} 的位数",
                seq, self.mask
            )));
        }

        let mut digit_iter = digits.chars();
        Ok(self
            .mask
            .chars()
            .map(|c| {
                if c == '#' {
                    digit_iter.next().unwrap_or('0')
                } else {
                    c
                }
            })
            .collect())
    }

    /// 生成完整序列号: {批次号}-{主体}{后缀}
    ///
    /// 后缀必须是字母，扫描时才能剥离
    pub fn generate(&self, order_number: &str, seq: i64, suffix: char) -> EngineResult<String> {
        if !suffix.is_ascii_alphabetic() {
            return Err(EngineError::Validation(format!(
                "序列号后缀必须是字母: {}",
                suffix
            )));
        }
        Ok(format!("{}-{}{}", order_number, self.fill(seq)?, suffix))
    }
}

/// 剥离一个结尾字母
pub fn strip_suffix(scanned: &str) -> &str {
    match scanned.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => &scanned[..scanned.len() - 1],
        _ => scanned,
    }
}

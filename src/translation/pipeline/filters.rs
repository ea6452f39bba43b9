//! 文本过滤器模块
//!
//! 判断提取出的直接文本是否值得翻译

use std::sync::OnceLock;

use regex::Regex;

use crate::translation::config::constants;

/// 只含数字、标点、符号和空白
fn symbols_only_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\W\d_]+$").ok()).as_ref()
}

/// 文本被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    SymbolsOnly,
    NoWords,
}

/// 文本过滤器
#[derive(Debug, Clone)]
pub struct TextFilter {
    min_chars: usize,
}

impl Default for TextFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFilter {
    pub fn new() -> Self {
        Self {
            min_chars: constants::MIN_TEXT_CHARS,
        }
    }

    /// 判断文本是否需要翻译
    pub fn is_translatable(&self, text: &str) -> bool {
        self.check(text).is_ok()
    }

    /// 检查文本，返回拒绝原因
    pub fn check(&self, text: &str) -> Result<(), RejectReason> {
        let trimmed = text.trim();

        if trimmed.split_whitespace().next().is_none() {
            return Err(RejectReason::NoWords);
        }

        if trimmed.chars().count() < self.min_chars {
            return Err(RejectReason::TooShort);
        }

        if self.is_symbols_only(trimmed) {
            return Err(RejectReason::SymbolsOnly);
        }

        Ok(())
    }

    fn is_symbols_only(&self, text: &str) -> bool {
        match symbols_only_regex() {
            Some(re) if re.is_match(text) => true,
            _ => !text.chars().any(|c| c.is_alphabetic()),
        }
    }
}

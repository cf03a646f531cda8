//! 输出脱敏与截断模块
//! 捕获的 stdout / stderr 在写入日志前先脱敏、再按大小截断
//!
//! 只作用于日志，返回给调用方的执行结果保持原样

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::config::OutputConfig;

/// 输出脱敏器
pub struct OutputSanitizer {
    rules: Vec<SanitizeRule>,
}

/// 脱敏规则
#[derive(Clone, Debug)]
pub struct SanitizeRule {
    /// 正则表达式
    pattern: Regex,
    /// 替换字符串
    replacement: String,
}

impl SanitizeRule {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }
}

/// 编译内置规则，模式均为常量
fn builtin(pattern: &str, replacement: &str) -> SanitizeRule {
    SanitizeRule::new(
        Regex::new(pattern).expect("builtin sanitize pattern must compile"),
        replacement,
    )
}

impl OutputSanitizer {
    /// 创建默认脱敏器
    pub fn new_default() -> Self {
        Self {
            rules: vec![
                // 私钥块（需在 secret/private_key 规则之前）
                builtin(
                    r"(?s)-----BEGIN ([A-Z ]*)PRIVATE KEY-----.*?-----END ([A-Z ]*)PRIVATE KEY-----",
                    "-----BEGIN ${1}PRIVATE KEY-----***-----END ${2}PRIVATE KEY-----",
                ),
                builtin(r"(?i)(password|passwd|pwd)[\s=:]+[^\s]+", "$1=***"),
                builtin(r"(?i)(api[_-]?key|apikey)[\s=:]+[^\s]+", "$1=***"),
                builtin(
                    r"(?i)(token|access[_-]?token|refresh[_-]?token)[\s=:]+[^\s]+",
                    "$1=***",
                ),
                builtin(
                    r"(?i)(secret|private[_-]?key|secret[_-]?key|passphrase)[\s=:]+[^\s]+",
                    "$1=***",
                ),
                builtin(
                    r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
                    "eyJ***.***.***",
                ),
            ],
        }
    }

    /// 脱敏输出
    pub fn sanitize(&self, output: &str) -> String {
        let mut result = output.to_string();

        for rule in &self.rules {
            result = rule
                .pattern
                .replace_all(&result, rule.replacement.as_str())
                .into_owned();
        }

        result
    }
}

/// 全局默认脱敏器
static DEFAULT_SANITIZER: Lazy<Arc<OutputSanitizer>> =
    Lazy::new(|| Arc::new(OutputSanitizer::new_default()));

/// 获取默认脱敏器
pub fn default_sanitizer() -> Arc<OutputSanitizer> {
    Arc::clone(&DEFAULT_SANITIZER)
}

/// 日志输出处理器
pub struct LogOutput {
    /// 每个输出流写入日志的最大字节数（0表示不限制）
    max_log_bytes: usize,
    /// 是否启用脱敏
    enable_sanitization: bool,
    sanitizer: Arc<OutputSanitizer>,
}

impl LogOutput {
    pub fn new(max_log_bytes: usize, enable_sanitization: bool) -> Self {
        Self {
            max_log_bytes,
            enable_sanitization,
            sanitizer: default_sanitizer(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.max_log_bytes, config.sanitize)
    }

    /// 处理输出（脱敏、截断）
    pub fn prepare(&self, output: &str) -> String {
        let processed = if self.enable_sanitization {
            self.sanitizer.sanitize(output)
        } else {
            output.to_string()
        };

        if self.max_log_bytes == 0 || processed.len() <= self.max_log_bytes {
            return processed;
        }

        let cut = floor_char_boundary(&processed, self.max_log_bytes);
        format!(
            "{}...\n[Output truncated: {} bytes total, showing first {} bytes]",
            &processed[..cut],
            processed.len(),
            cut
        )
    }
}

/// 不超过 `index` 的最近字符边界
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut cut = index.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

//! 配置系统
//! 从环境变量加载应用配置（日志、SSH 超时、主机密钥策略、密钥存储、输出处理）
//!
//! 动作本身的运行参数（主机、凭据、命令）不在这里，见 `action` 模块

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::ssh::model::{HostKeyVerification, Timeouts};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    /// 连接超时（秒），0 表示不限制
    pub connect_timeout_secs: u64,
    /// 握手超时（秒），0 表示不限制
    pub handshake_timeout_secs: u64,
    /// 命令执行超时（秒），0 表示不限制
    pub command_timeout_secs: u64,
    /// 主机密钥验证策略
    pub host_key_verification: HostKeyVerification,
    /// 已知主机文件，每行 `host:port sha256hex`
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,
    /// 已知主机指纹，`host:port` -> SHA-256 十六进制，由 `known_hosts_file` 加载
    #[serde(skip)]
    pub known_hosts: Option<HashMap<String, String>>,
}

impl SshSettings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_secs(
            self.connect_timeout_secs,
            self.handshake_timeout_secs,
            self.command_timeout_secs,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    /// 私钥文件集目录
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// 日志中每个输出流的最大字节数（0 表示不限制）
    pub max_log_bytes: usize,
    /// 记录日志前是否脱敏
    pub sanitize: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub ssh: SshSettings,
    pub keystore: KeystoreConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从环境变量加载配置（前缀为 SSH_ACTION_）
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self::defaults()?.add_source(
            Environment::with_prefix("SSH_ACTION")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = settings.build()?.try_deserialize()?;
        if let Some(path) = &config.ssh.known_hosts_file {
            config.ssh.known_hosts = Some(load_known_hosts(path)?);
        }
        config.validate()?;

        Ok(config)
    }

    fn defaults() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("ssh.connect_timeout_secs", 10)?
            .set_default("ssh.handshake_timeout_secs", 10)?
            .set_default("ssh.command_timeout_secs", 0)?
            .set_default("ssh.host_key_verification", "accept")?
            .set_default("keystore.dir", "./privateKeyFile")?
            .set_default("output.max_log_bytes", 65536)?
            .set_default("output.sanitize", true)
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        if self.ssh.host_key_verification == HostKeyVerification::Strict
            && self.ssh.known_hosts.as_ref().map_or(true, |hosts| hosts.is_empty())
        {
            return Err(ConfigError::Message(
                "Strict host key verification requires a non-empty ssh.known_hosts_file"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// 读取已知主机文件
pub fn load_known_hosts(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Message(format!(
            "Unable to read known hosts file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_known_hosts(&content)
}

/// 解析已知主机内容
///
/// 每行 `host:port sha256hex`，空行和 `#` 开头的行跳过。
/// IPv6 地址写成 `[::1]:22`，查找时使用去掉括号后的 `host:port`
pub fn parse_known_hosts(content: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut known_hosts = HashMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |reason: &str| {
            ConfigError::Message(format!(
                "Malformed known hosts entry on line {}: {}",
                index + 1,
                reason
            ))
        };

        let mut parts = line.split_whitespace();
        let (Some(target), Some(fingerprint), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected `host:port sha256hex`"));
        };

        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| malformed("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port.parse().map_err(|_| malformed("invalid port"))?;
        if host.is_empty() || port == 0 {
            return Err(malformed("invalid host or port"));
        }

        let fingerprint = fingerprint.to_ascii_lowercase();
        if hex::decode(&fingerprint).map_or(true, |bytes| bytes.is_empty()) {
            return Err(malformed("fingerprint must be hex"));
        }

        known_hosts.insert(format!("{}:{}", host, port), fingerprint);
    }

    Ok(known_hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("SSH_ACTION_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = AppConfig::from_env().expect("defaults should load");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ssh.connect_timeout_secs, 10);
        assert_eq!(config.ssh.command_timeout_secs, 0);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Accept);
        assert_eq!(config.keystore.dir, PathBuf::from("./privateKeyFile"));
        assert_eq!(config.output.max_log_bytes, 65536);
        assert!(config.output.sanitize);
        assert!(config.ssh.timeouts().command.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        clear_env();
        std::env::set_var("SSH_ACTION_LOGGING__LEVEL", "debug");
        std::env::set_var("SSH_ACTION_SSH__COMMAND_TIMEOUT_SECS", "45");
        std::env::set_var("SSH_ACTION_SSH__HOST_KEY_VERIFICATION", "disabled");

        let config = AppConfig::from_env().expect("overrides should load");
        clear_env();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ssh.command_timeout_secs, 45);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Disabled);
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        clear_env();
        std::env::set_var("SSH_ACTION_LOGGING__LEVEL", "loud");

        let result = AppConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_strict_without_known_hosts_rejected() {
        clear_env();
        std::env::set_var("SSH_ACTION_SSH__HOST_KEY_VERIFICATION", "strict");

        let result = AppConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_strict_with_known_hosts_file() {
        use std::io::Write;

        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# deploy targets").unwrap();
        writeln!(file, "10.0.0.5:22 ABCD").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "build.example.com:2222 {}", "ef".repeat(32)).unwrap();
        file.flush().unwrap();

        std::env::set_var("SSH_ACTION_SSH__HOST_KEY_VERIFICATION", "strict");
        std::env::set_var("SSH_ACTION_SSH__KNOWN_HOSTS_FILE", file.path());

        let result = AppConfig::from_env();
        clear_env();

        let config = result.expect("strict mode with known hosts file should load");
        let known_hosts = config.ssh.known_hosts.expect("known hosts loaded");
        assert_eq!(known_hosts.len(), 2);
        assert_eq!(known_hosts.get("10.0.0.5:22").map(String::as_str), Some("abcd"));
        assert_eq!(
            known_hosts.get("build.example.com:2222"),
            Some(&"ef".repeat(32))
        );
    }

    #[test]
    #[serial]
    fn test_strict_with_empty_known_hosts_file_rejected() {
        clear_env();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::env::set_var("SSH_ACTION_SSH__HOST_KEY_VERIFICATION", "strict");
        std::env::set_var("SSH_ACTION_SSH__KNOWN_HOSTS_FILE", file.path());

        let result = AppConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_missing_known_hosts_file_rejected() {
        clear_env();
        std::env::set_var(
            "SSH_ACTION_SSH__KNOWN_HOSTS_FILE",
            "/nonexistent/ssh-action/known_hosts",
        );

        let result = AppConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_known_hosts_ipv6() {
        let known_hosts = parse_known_hosts("[::1]:22 aa\n").unwrap();
        assert_eq!(known_hosts.get("::1:22").map(String::as_str), Some("aa"));
    }

    #[test]
    fn test_parse_known_hosts_rejects_malformed_lines() {
        assert!(parse_known_hosts("10.0.0.5 abcd").is_err());
        assert!(parse_known_hosts("10.0.0.5:ssh abcd").is_err());
        assert!(parse_known_hosts("10.0.0.5:22").is_err());
        assert!(parse_known_hosts("10.0.0.5:22 not-hex").is_err());
        assert!(parse_known_hosts("10.0.0.5:22 abcd extra").is_err());
    }
}

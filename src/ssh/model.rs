//! SSH 连接模型
//!
//! 一次调用的连接参数、认证方式和执行结果

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// 主机密钥验证策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// 严格模式：只接受已知的主机密钥
    Strict,
    /// 接受模式：未知主机直接接受，已知主机必须匹配
    #[default]
    Accept,
    /// 禁用验证（不安全，仅用于开发/测试）
    Disabled,
}

/// SSH 认证方式
///
/// 凭据使用 `Secret` 包装，调用结束即被清零，且不会出现在 `Debug` 输出中
#[derive(Debug, Clone)]
pub enum SshAuth {
    /// 密码认证
    Password { password: Secret<String> },
    /// 私钥认证
    PrivateKey {
        /// 私钥内容（OpenSSH / PEM 文本）
        private_key: Secret<String>,
        /// 私钥口令（如果有）
        passphrase: Option<Secret<String>>,
    },
}

impl SshAuth {
    pub fn password(password: impl Into<String>) -> Self {
        SshAuth::Password {
            password: Secret::new(password.into()),
        }
    }

    pub fn private_key(private_key: impl Into<String>, passphrase: Option<String>) -> Self {
        SshAuth::PrivateKey {
            private_key: Secret::new(private_key.into()),
            passphrase: passphrase.map(Secret::new),
        }
    }

    /// 认证方式名称（用于日志）
    pub fn mode(&self) -> &'static str {
        match self {
            SshAuth::Password { .. } => "password",
            SshAuth::PrivateKey { .. } => "publickey",
        }
    }
}

/// 超时设置，`None` 表示不限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub handshake: Option<Duration>,
    pub command: Option<Duration>,
}

impl Timeouts {
    /// 以秒构建，0 表示不限制
    pub fn from_secs(connect: u64, handshake: u64, command: u64) -> Self {
        let opt = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            connect: opt(connect),
            handshake: opt(handshake),
            command: opt(command),
        }
    }
}

/// SSH 连接配置，每次调用构建一次
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 主机地址
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub user: String,
    /// 认证方式
    pub auth: SshAuth,
    /// 远程执行的命令
    pub command: String,
    pub timeouts: Timeouts,
    pub host_key_verification: HostKeyVerification,
    /// 已知的主机密钥指纹，`host:port` -> SHA-256 十六进制
    pub known_hosts: Option<HashMap<String, String>>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        auth: SshAuth,
        command: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            auth,
            command: command.into(),
            timeouts: Timeouts::default(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_host_key_verification(
        mut self,
        verification: HostKeyVerification,
        known_hosts: Option<HashMap<String, String>>,
    ) -> Self {
        self.host_key_verification = verification;
        self.known_hosts = known_hosts;
        self
    }

    /// 获取目标地址字符串
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    /// 校验配置，任何网络调用之前执行
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.host.trim().is_empty() {
            return Err(ActionError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ActionError::Config(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(ActionError::Config("user must not be empty".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(ActionError::Config("command must not be empty".to_string()));
        }
        if let SshAuth::PrivateKey { private_key, .. } = &self.auth {
            if private_key.expose_secret().trim().is_empty() {
                return Err(ActionError::Config(
                    "private key must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn connection_error(&self, reason: impl Into<String>) -> ActionError {
        ActionError::Connection {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn execution_error(&self, reason: impl Into<String>) -> ActionError {
        ActionError::Execution {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            command: self.command.clone(),
            reason: reason.into(),
        }
    }
}

/// SSH 执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// 认证是否成功
    pub connected: bool,
    /// 标准输出（逐行拼接，每行以 `\n` 结尾）
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 远端退出码（服务端未报告时为 None）
    pub exit_status: Option<u32>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.connected && self.exit_status.map_or(true, |code| code == 0)
    }
}

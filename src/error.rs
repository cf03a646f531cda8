//! 统一错误模型
//! 定义动作执行过程中的所有错误类型
//!
//! 错误信息只携带主机、端口、用户和命令，不包含任何凭据

use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置错误（在任何网络调用之前发现）
    Configuration,
    /// 连接或认证失败
    Connection,
    /// 命令下发或输出读取失败
    Execution,
}

/// 动作错误类型
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to establish SSH connection for {user}@{host} on port {port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        user: String,
        reason: String,
    },

    #[error("Failed to run command `{command}` for {user}@{host} on port {port}: {reason}")]
    Execution {
        host: String,
        port: u16,
        user: String,
        command: String,
        reason: String,
    },
}

impl ActionError {
    /// 获取错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Config(_) => ErrorKind::Configuration,
            ActionError::Connection { .. } => ErrorKind::Connection,
            ActionError::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// 获取进程退出码
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::Connection => 3,
            ErrorKind::Execution => 4,
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for ActionError {
    fn from(e: config::ConfigError) -> Self {
        ActionError::Config(e.to_string())
    }
}

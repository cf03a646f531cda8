//! SSH 工作流动作库
//! 通过 SSH 在远端主机执行一条命令并收集输出

pub mod action;
pub mod config;
pub mod error;
pub mod keystore;
pub mod output;
pub mod ssh;
pub mod telemetry;

pub use action::{RuntimeArguments, SshAction};
pub use error::{ActionError, ErrorKind};
pub use ssh::{ConnectionConfig, ExecutionResult, SshAuth, SshExecutor};

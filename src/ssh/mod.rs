//! SSH执行模块
//! 连接建立、认证、单次命令执行与输出收集

pub mod drain;
pub mod executor;
pub mod model;
pub mod transport;

pub use executor::SshExecutor;
pub use model::{ConnectionConfig, ExecutionResult, HostKeyVerification, SshAuth, Timeouts};
pub use transport::{Connector, RemoteConnection, RemoteProcess, RusshConnector, TransportError};

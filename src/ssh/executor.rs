//! SSH执行器模块
//! 建立连接、认证、执行一次命令并收集 stdout / stderr
//!
//! 连接在每次调用内建立并关闭，不做任何重试

use std::io;
use std::time::Instant;

use tokio::time::timeout;
use tracing::{debug, error, info};

use super::drain;
use super::model::{ConnectionConfig, ExecutionResult};
use super::transport::{Connector, RemoteConnection, RemoteProcess, RusshConnector};
use crate::error::ActionError;

/// 远程命令执行器
pub struct SshExecutor<C = RusshConnector> {
    connector: C,
}

impl SshExecutor<RusshConnector> {
    pub fn new() -> Self {
        Self {
            connector: RusshConnector,
        }
    }
}

impl Default for SshExecutor<RusshConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SshExecutor<C> {
    /// 使用自定义连接器创建执行器
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }

    /// 执行命令
    ///
    /// 配置错误在任何网络调用之前返回；认证被拒绝时返回 `ActionError::Connection`，
    /// 不会打开会话。连接在所有路径上都会被关闭。
    pub async fn execute(&self, config: &ConnectionConfig) -> Result<ExecutionResult, ActionError> {
        config.validate()?;

        let start_time = Instant::now();

        debug!(
            host = %config.host,
            port = config.port,
            user = %config.user,
            auth = config.auth.mode(),
            "Connecting to remote host"
        );

        let mut connection = self.connector.connect(config).await.map_err(|e| {
            error!(error = %e, remote = %config.target(), "SSH连接失败");
            config.connection_error(e.to_string())
        })?;

        let outcome = Self::run(connection.as_mut(), config).await;
        connection.close().await;

        let duration_secs = start_time.elapsed().as_secs_f64();
        let label = match &outcome {
            Ok(_) => "success",
            Err(ActionError::Connection { .. }) => "connection_error",
            Err(_) => "execution_error",
        };
        metrics::counter!("ssh_action_executions_total", "outcome" => label).increment(1);
        metrics::histogram!("ssh_action_duration_seconds").record(duration_secs);

        if let Ok(result) = &outcome {
            info!(
                host = %config.host,
                port = config.port,
                exit_status = ?result.exit_status,
                duration_secs = duration_secs,
                stdout_len = result.stdout.len(),
                stderr_len = result.stderr.len(),
                "Command executed"
            );
        }

        outcome
    }

    async fn run(
        connection: &mut dyn RemoteConnection,
        config: &ConnectionConfig,
    ) -> Result<ExecutionResult, ActionError> {
        let connected = connection
            .authenticate(&config.user, &config.auth)
            .await
            .map_err(|e| {
                error!(error = %e, remote = %config.target(), "SSH认证失败");
                config.connection_error(e.to_string())
            })?;

        if !connected {
            error!(remote = %config.target(), "SSH认证失败");
            return Err(config.connection_error("authentication rejected"));
        }

        info!(remote = %config.target(), "SSH认证成功，准备执行命令");

        let process = connection.exec(&config.command).await.map_err(|e| {
            error!(error = %e, "执行命令失败");
            config.execution_error(e.to_string())
        })?;

        let collected = match config.timeouts.command {
            Some(limit) => timeout(limit, collect(process)).await.map_err(|_| {
                error!(remote = %config.target(), "命令执行超时");
                config.execution_error(format!("command timed out after {:?}", limit))
            })?,
            None => collect(process).await,
        };

        let (stdout, stderr, exit_status) = collected.map_err(|e| {
            error!(error = %e, "读取命令输出失败");
            config.execution_error(e.to_string())
        })?;

        Ok(ExecutionResult {
            connected,
            stdout,
            stderr,
            exit_status,
        })
    }
}

/// 读完两条输出流并等待通道结束
async fn collect(process: RemoteProcess) -> io::Result<(String, String, Option<u32>)> {
    let (stdout, stderr) = drain::drain_both(process.stdout, process.stderr).await?;
    let exit_status = process.completion.await.map_err(io::Error::other)??;
    Ok((stdout, stderr, exit_status))
}

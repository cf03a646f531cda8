//! SSH 传输层
//!
//! `Connector` / `RemoteConnection` 把执行器与具体 SSH 库隔开，
//! 默认实现基于 russh

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::decode_secret_key;
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use secrecy::ExposeSecret;
use sha2::Digest;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::model::{ConnectionConfig, HostKeyVerification, SshAuth};

/// 单条输出管道的缓冲大小
const PIPE_CAPACITY: usize = 64 * 1024;

/// SSH_EXTENDED_DATA_STDERR
const EXTENDED_DATA_STDERR: u32 = 1;

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TCP connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("SSH handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

pub type OutputReader = Box<dyn AsyncRead + Send + Unpin>;

/// 已下发的远程命令
pub struct RemoteProcess {
    pub stdout: OutputReader,
    pub stderr: OutputReader,
    /// 通道结束时完成，返回远端退出码（如果有）
    pub completion: JoinHandle<io::Result<Option<u32>>>,
}

/// 建立到远端主机的传输连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn RemoteConnection>, TransportError>;
}

/// 一条已建立的传输连接
#[async_trait]
pub trait RemoteConnection: Send {
    /// 返回认证是否成功
    async fn authenticate(&mut self, user: &str, auth: &SshAuth) -> Result<bool, TransportError>;

    /// 打开会话通道并执行一次命令
    async fn exec(&mut self, command: &str) -> Result<RemoteProcess, TransportError>;

    /// 断开连接，任何路径上都会被调用
    async fn close(&mut self);
}

/// 基于 russh 的连接器
#[derive(Debug, Clone, Default)]
pub struct RusshConnector;

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn RemoteConnection>, TransportError> {
        let addr = (config.host.as_str(), config.port);
        let stream = match config.timeouts.connect {
            Some(limit) => timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| TransportError::ConnectTimeout(limit))??,
            None => TcpStream::connect(addr).await?,
        };

        let client_config = Arc::new(client::Config::default());
        let checker = HostKeyChecker::new(config);
        let handshake = client::connect_stream(client_config, stream, checker);

        let handle = match config.timeouts.handshake {
            Some(limit) => timeout(limit, handshake)
                .await
                .map_err(|_| TransportError::HandshakeTimeout(limit))??,
            None => handshake.await?,
        };

        debug!(host = %config.host, port = config.port, "SSH transport established");

        Ok(Box::new(RusshConnection { handle }))
    }
}

struct RusshConnection {
    handle: client::Handle<HostKeyChecker>,
}

#[async_trait]
impl RemoteConnection for RusshConnection {
    async fn authenticate(&mut self, user: &str, auth: &SshAuth) -> Result<bool, TransportError> {
        let accepted = match auth {
            SshAuth::Password { password } => {
                self.handle
                    .authenticate_password(user, password.expose_secret().as_str())
                    .await?
            }
            SshAuth::PrivateKey {
                private_key,
                passphrase,
            } => {
                let key = decode_secret_key(
                    private_key.expose_secret(),
                    passphrase.as_ref().map(|p| p.expose_secret().as_str()),
                )
                .map_err(|e| TransportError::InvalidKey(e.to_string()))?;

                self.handle
                    .authenticate_publickey(user, Arc::new(key))
                    .await?
            }
        };

        Ok(accepted)
    }

    async fn exec(&mut self, command: &str) -> Result<RemoteProcess, TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let (stdout_tx, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_tx, stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);

        // 通道消息分流到两条管道，管道写端随任务结束而关闭
        let completion = tokio::spawn(async move {
            let mut stdout_tx = stdout_tx;
            let mut stderr_tx = stderr_tx;
            let mut exit_status = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => stdout_tx.write_all(&data).await?,
                    ChannelMsg::ExtendedData { data, ext } if ext == EXTENDED_DATA_STDERR => {
                        stderr_tx.write_all(&data).await?
                    }
                    ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }

            if let Err(e) = channel.close().await {
                debug!(error = %e, "Channel already closed");
            }

            Ok::<_, io::Error>(exit_status)
        });

        Ok(RemoteProcess {
            stdout: Box::new(stdout_rx),
            stderr: Box::new(stderr_rx),
            completion,
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(error = %e, "Disconnect failed, connection already gone");
        }
    }
}

/// SHA-256 指纹（十六进制）
pub fn fingerprint(key_bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(key_bytes))
}

/// 主机密钥校验处理器
struct HostKeyChecker {
    verification_mode: HostKeyVerification,
    known_hosts: Option<HashMap<String, String>>,
    host: String,
    port: u16,
}

impl HostKeyChecker {
    fn new(config: &ConnectionConfig) -> Self {
        Self {
            verification_mode: config.host_key_verification.clone(),
            known_hosts: config.known_hosts.clone(),
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// 根据策略判断是否接受给定指纹
    fn accepts(&self, fingerprint: &str) -> bool {
        let host_key = format!("{}:{}", self.host, self.port);

        if self.verification_mode == HostKeyVerification::Disabled {
            warn!(host = %host_key, "Host key verification DISABLED - accepting all keys");
            return true;
        }

        let stored = self
            .known_hosts
            .as_ref()
            .and_then(|known_hosts| known_hosts.get(&host_key));

        match (stored, &self.verification_mode) {
            (Some(stored), _) if stored.eq_ignore_ascii_case(fingerprint) => {
                debug!(host = %host_key, "Host key verified");
                true
            }
            (Some(stored), _) => {
                error!(
                    host = %host_key,
                    expected = %stored,
                    actual = %fingerprint,
                    "Host key mismatch - REJECTING CONNECTION"
                );
                false
            }
            (None, HostKeyVerification::Strict) => {
                error!(host = %host_key, "Unknown host in strict mode - rejecting connection");
                false
            }
            (None, _) => {
                info!(
                    host = %host_key,
                    fingerprint = %fingerprint,
                    "First time connecting - accepting host key"
                );
                true
            }
        }
    }
}

#[async_trait]
impl client::Handler for HostKeyChecker {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self.accepts(&fingerprint(&server_public_key.public_key_bytes())))
    }
}

//! SSH 工作流动作
//!
//! 把宿主提供的运行参数（字符串键值）转成 `ConnectionConfig`，
//! 执行一次远程命令，并把结果写入日志

use std::collections::HashMap;

use secrecy::ExposeSecret;
use tracing::{error, info, info_span, Instrument};

use crate::config::{AppConfig, SshSettings};
use crate::error::ActionError;
use crate::keystore::{KeyFileSet, PRIVATE_KEY_LOCATION};
use crate::output::LogOutput;
use crate::ssh::{Connector, ConnectionConfig, ExecutionResult, RusshConnector, SshAuth, SshExecutor};

/// 运行参数名
pub mod arg_names {
    pub const USE_PASSWORD_SSH: &str = "usePasswordSSH";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    pub const PRIVATE_KEY_PASSPHRASE: &str = "privateKeyPassphrase";
    pub const CMD: &str = "cmd";
}

pub type RuntimeArguments = HashMap<String, String>;

/// 解析 `key=value` 形式的参数列表
pub fn parse_runtime_arguments<I, S>(pairs: I) -> Result<RuntimeArguments, ActionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|pair| {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                // 参数可能整段都是口令，只报告长度
                _ => Err(ActionError::Config(format!(
                    "Runtime argument must be key=value ({} chars)",
                    pair.chars().count()
                ))),
            }
        })
        .collect()
}

/// 只有字面量 "true" 表示密码认证
pub fn parse_use_password(value: Option<&str>) -> bool {
    value == Some("true")
}

/// 解析端口，非数字（含首尾空白）或越界均为配置错误
pub fn parse_port(value: Option<&str>) -> Result<u16, ActionError> {
    let raw = value.ok_or_else(|| ActionError::Config("Missing runtime argument: port".to_string()))?;

    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => {
            error!(port = %raw, "Badly formatted port");
            Err(ActionError::Config(format!("Badly formatted port: {}", raw)))
        }
    }
}

fn required<'a>(args: &'a RuntimeArguments, key: &str) -> Result<&'a str, ActionError> {
    args.get(key)
        .map(String::as_str)
        .ok_or_else(|| ActionError::Config(format!("Missing runtime argument: {}", key)))
}

/// SSH 动作
pub struct SshAction<C = RusshConnector> {
    executor: SshExecutor<C>,
    settings: SshSettings,
    key_file_set: KeyFileSet,
    log_output: LogOutput,
}

impl SshAction<RusshConnector> {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_executor(SshExecutor::new(), config)
    }
}

impl<C: Connector> SshAction<C> {
    pub fn with_executor(executor: SshExecutor<C>, config: &AppConfig) -> Self {
        Self {
            executor,
            settings: config.ssh.clone(),
            key_file_set: KeyFileSet::new(config.keystore.dir.clone()),
            log_output: LogOutput::from_config(&config.output),
        }
    }

    /// 由运行参数构建连接配置
    ///
    /// 仅在私钥模式下读取私钥文件；所有错误都在网络调用之前返回
    pub async fn build_config(
        &self,
        args: &RuntimeArguments,
    ) -> Result<ConnectionConfig, ActionError> {
        let use_password = parse_use_password(args.get(arg_names::USE_PASSWORD_SSH).map(String::as_str));
        let port = parse_port(args.get(arg_names::PORT).map(String::as_str))?;
        let host = required(args, arg_names::HOST)?;
        let user = required(args, arg_names::USER)?;
        let command = required(args, arg_names::CMD)?;

        let auth = if use_password {
            SshAuth::password(required(args, arg_names::PASSWORD)?)
        } else {
            let private_key = self.key_file_set.read(PRIVATE_KEY_LOCATION).await?;
            let passphrase = args
                .get(arg_names::PRIVATE_KEY_PASSPHRASE)
                .filter(|p| !p.is_empty())
                .cloned();
            SshAuth::private_key(private_key.expose_secret().as_str(), passphrase)
        };

        let config = ConnectionConfig::new(host, port, user, auth, command)
            .with_timeouts(self.settings.timeouts())
            .with_host_key_verification(
                self.settings.host_key_verification.clone(),
                self.settings.known_hosts.clone(),
            );
        config.validate()?;

        Ok(config)
    }

    /// 执行动作：构建配置、执行命令、记录结果
    pub async fn run(&self, args: &RuntimeArguments) -> Result<ExecutionResult, ActionError> {
        let run_id = uuid::Uuid::new_v4();

        async {
            let config = self.build_config(args).await?;

            match self.executor.execute(&config).await {
                Ok(result) => {
                    self.log_result(&config, &result);
                    Ok(result)
                }
                Err(e) => {
                    error!(error = %e, "SSH action failed");
                    Err(e)
                }
            }
        }
        .instrument(info_span!("ssh_action", run_id = %run_id))
        .await
    }

    fn log_result(&self, config: &ConnectionConfig, result: &ExecutionResult) {
        info!(
            command = %self.log_output.prepare(&config.command),
            user = %config.user,
            host = %config.host,
            port = config.port,
            exit_status = ?result.exit_status,
            "Finished running command"
        );
        info!(output = %self.log_output.prepare(&result.stdout), "Output");
        info!(errors = %self.log_output.prepare(&result.stderr), "Errors");
    }
}

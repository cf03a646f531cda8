//! ssh-action 入口
//! 以 `key=value` 形式接收运行参数，执行一次远程命令

use ssh_action::{
    action::parse_runtime_arguments,
    config::AppConfig,
    keystore::{KeyFileSet, PRIVATE_KEY_LOCATION},
    telemetry, ActionError, SshAction,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version") => {
            println!("ssh-action {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") | None => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    // 加载 .env 文件（开发环境），生产环境直接设置环境变量
    if let Ok(env) = std::env::var("SSH_ACTION_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let error = ActionError::from(e);
            eprintln!("{}", error);
            std::process::exit(error.exit_code());
        }
    };

    telemetry::init_telemetry(&config.logging);

    if args[0] == "store-key" {
        let source = args
            .get(1)
            .ok_or_else(|| anyhow::anyhow!("用法: ssh-action store-key <私钥文件>"))?;
        let content = tokio::fs::read(source).await?;
        KeyFileSet::new(config.keystore.dir.clone())
            .store(PRIVATE_KEY_LOCATION, &content)
            .await?;
        return Ok(());
    }

    let outcome = match parse_runtime_arguments(&args) {
        Ok(runtime_args) => SshAction::from_config(&config).run(&runtime_args).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(kind = ?e.kind(), "{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// 打印帮助信息
fn print_help() {
    println!("ssh-action {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法:");
    println!("  ssh-action key=value ...          执行一次远程命令");
    println!("  ssh-action store-key <私钥文件>   保存私钥到私钥文件集");
    println!();
    println!("运行参数:");
    println!("  usePasswordSSH        \"true\" 使用密码认证，其它值使用私钥认证");
    println!("  host, port, user      远端主机、端口与用户名");
    println!("  password              密码（密码认证时必填）");
    println!("  privateKeyPassphrase  私钥口令（可选）");
    println!("  cmd                   要执行的命令");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  应用配置通过 SSH_ACTION_ 前缀的环境变量完成，例如");
    println!("  SSH_ACTION_LOGGING__LEVEL=debug");
    println!("  SSH_ACTION_SSH__COMMAND_TIMEOUT_SECS=300");
    println!("  SSH_ACTION_KEYSTORE__DIR=/var/lib/ssh-action/privateKeyFile");
    println!("  SSH_ACTION_SSH__KNOWN_HOSTS_FILE=/etc/ssh-action/known_hosts  (每行 host:port sha256hex)");
}

//! codebee - Rust 自主编码智能体
//!
//! 入口：解析命令行、初始化日志、加载配置，然后运行单个任务、交互会话或打印配置。

use anyhow::Context;
use clap::Parser;
use codebee::config::load_config;
use codebee::observability;
use codebee::ui::{print_config, run_interactive, run_task, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(args.session.config_file.as_deref())
                .context("Failed to load configuration")?;
            let execution = run_task(&config, &args.session, &args.task)
                .await
                .context("Failed to start task")?;
            if !execution.success {
                std::process::exit(1);
            }
        }
        Commands::Interactive(args) => {
            let config = load_config(args.config_file.as_deref())
                .context("Failed to load configuration")?;
            run_interactive(config, args)
                .await
                .context("Interactive session failed")?;
        }
        Commands::ShowConfig(args) => {
            let config = load_config(args.config_file.as_deref())
                .context("Failed to load configuration")?;
            let provider = match args.provider {
                Some(p) => p,
                None => config.provider().context("Invalid default_provider")?,
            };
            print_config(&config, provider, &config.model_parameters(provider));
        }
    }

    Ok(())
}

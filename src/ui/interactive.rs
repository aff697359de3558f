//! 交互模式：逐行读取 stdin，每行作为一个任务用新的 Agent 执行

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::AppConfig;
use crate::core::{AgentError, Execution};
use crate::ui::{console, SessionArgs};

/// REPL 命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Status,
    Clear,
    Exit,
    Empty,
    Task(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "" => ReplCommand::Empty,
        "help" | "?" => ReplCommand::Help,
        "status" => ReplCommand::Status,
        "clear" => ReplCommand::Clear,
        "exit" | "quit" => ReplCommand::Exit,
        _ => ReplCommand::Task(line.to_string()),
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  help          show this message");
    println!("  status        show provider, workspace and the last result");
    println!("  clear         clear the screen");
    println!("  exit | quit   leave the session");
    println!("Anything else is run as a task in the working directory.");
}

fn print_status(config: &AppConfig, args: &SessionArgs, last: Option<&Execution>) {
    let provider = args
        .provider
        .map(|p| p.to_string())
        .unwrap_or_else(|| config.default_provider.clone());
    let workspace = args
        .workspace_root()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| e.to_string());
    println!("  provider:  {}", provider);
    if let Some(model) = &args.model {
        println!("  model:     {}", model);
    }
    println!("  workspace: {}", workspace);
    println!("  max_steps: {}", args.max_steps.unwrap_or(config.max_steps));
    match last {
        Some(exec) => println!(
            "  last task: {} in {} steps ({} tokens)",
            if exec.success { "succeeded".green() } else { "failed".red() },
            exec.steps.len(),
            exec.total_tokens.total_tokens
        ),
        None => println!("  last task: none"),
    }
}

/// 运行交互会话，直到 exit / quit 或 stdin 关闭
pub async fn run_interactive(config: AppConfig, args: SessionArgs) -> Result<(), AgentError> {
    // 启动前先确认工作区可用
    args.workspace_root()?;
    println!("{}", "codebee interactive session. Type 'help' for commands.".bold().cyan());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut last: Option<Execution> = None;
    loop {
        let _ = stdout.write_all(b"codebee> ").await;
        let _ = stdout.flush().await;
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        };
        match parse_command(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Help => print_help(),
            ReplCommand::Status => print_status(&config, &args, last.as_ref()),
            ReplCommand::Clear => print!("\x1B[2J\x1B[1;1H"),
            ReplCommand::Exit => break,
            ReplCommand::Task(task) => match console::run_task(&config, &args, &task).await {
                Ok(exec) => last = Some(exec),
                Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
            },
        }
    }
    println!("Goodbye.");
    Ok(())
}

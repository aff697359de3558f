//! 控制台输出：消费 AgentEvent 逐步打印，结束时打印结果面板
//!
//! 引擎不依赖本模块；CLI 通过 AgentBuilder::events 订阅事件。

use colored::{ColoredString, Colorize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ModelParameters};
use crate::core::{AgentError, AgentState, AgentStep, Execution};
use crate::llm::Provider;
use crate::react::AgentEvent;
use crate::ui::SessionArgs;

const PREVIEW_CHARS: usize = 160;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        format!("{}...", flat.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        flat
    }
}

fn state_label(state: AgentState) -> ColoredString {
    let label = state.as_str().to_uppercase();
    match state {
        AgentState::Thinking => label.cyan(),
        AgentState::CallingTool => label.yellow(),
        AgentState::Reflecting => label.magenta(),
        AgentState::Completed => label.green().bold(),
        AgentState::Error => label.red().bold(),
    }
}

/// 单步摘要：首行为步号与状态，其后每个工具调用一行，最后是反思或错误
pub fn format_step(step: &AgentStep) -> String {
    let mut lines = vec![format!(
        "{} {}",
        format!("[step {}]", step.step_number).bold(),
        state_label(step.state)
    )];
    if let Some(resp) = &step.llm_response {
        if !resp.content.trim().is_empty() {
            lines.push(format!("  {}", preview(&resp.content).dimmed()));
        }
    }
    for call in &step.tool_calls {
        let result = step.tool_results.iter().find(|r| r.call_id == call.id);
        let mark = match result {
            Some(r) if r.success => "ok".green(),
            Some(r) => format!("status {}", r.status).red(),
            None => "-".normal(),
        };
        lines.push(format!(
            "  {} {} ({})",
            "->".blue(),
            call.name,
            mark
        ));
        if let Some(r) = result.filter(|r| !r.success) {
            lines.push(format!("     {}", preview(&r.content_for_model()).red()));
        }
    }
    if let Some(reflection) = &step.reflection {
        lines.push(format!("  {} {}", "reflection:".magenta(), preview(reflection)));
    }
    if let Some(error) = &step.error {
        lines.push(format!("  {} {}", "error:".red(), error));
    }
    lines.join("\n")
}

/// 结果面板
pub fn format_execution(execution: &Execution) -> String {
    let status = if execution.success {
        "SUCCESS".green().bold()
    } else {
        "FAILED".red().bold()
    };
    let mut lines = vec![
        "=".repeat(60),
        format!("{} {}", "Result:".bold(), status),
        format!("Steps: {}", execution.steps.len()),
        format!(
            "Tokens: {} (prompt {}, completion {})",
            execution.total_tokens.total_tokens,
            execution.total_tokens.prompt_tokens,
            execution.total_tokens.completion_tokens
        ),
        format!("Time: {:.1}s", execution.execution_time.as_secs_f64()),
    ];
    if let Some(failure) = &execution.failure {
        lines.push(format!("Failure: {:?}: {}", failure.kind, failure.message));
    }
    if let Some(result) = &execution.final_result {
        lines.push(String::new());
        lines.push(result.clone());
    }
    lines.push("=".repeat(60));
    lines.join("\n")
}

/// 后台打印事件；发送端全部关闭后结束
pub fn spawn_reporter(mut rx: UnboundedReceiver<AgentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::TaskStarted { task, max_steps } => {
                    println!("{} {} (max {} steps)", "Task:".bold().cyan(), preview(&task), max_steps);
                }
                AgentEvent::StepStarted { step_number, max_steps } => {
                    tracing::debug!(step_number, max_steps, "thinking");
                }
                AgentEvent::StepRecorded { step } => println!("{}", format_step(&step)),
                AgentEvent::TaskFinished { .. } => {}
            }
        }
    })
}

/// 打印某 Provider 的生效参数（API Key 已打码）
pub fn print_config(config: &AppConfig, provider: Provider, params: &ModelParameters) {
    println!("{}", "codebee configuration".bold().cyan());
    println!("  default_provider: {}", config.default_provider);
    println!("  max_steps:        {}", config.max_steps);
    println!("  reflection:       {:?}", config.reflection);
    println!("  tool_timeout:     {}s", config.tool_timeout_secs);
    println!("{} {}", "provider".bold(), provider.to_string().yellow());
    let masked = params.masked();
    match serde_json::to_string_pretty(&masked) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "failed to render parameters"),
    }
}

/// 以控制台输出运行一个任务：Ctrl-C 取消，返回（可能不完整的）Execution
pub async fn run_task(
    config: &AppConfig,
    args: &SessionArgs,
    task: &str,
) -> Result<Execution, AgentError> {
    let root = args.workspace_root()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let mut agent = args.agent_builder(config).events(tx).build()?;
    agent.new_task(task, args.task_options(root, task))?;

    let reporter = spawn_reporter(rx);
    let token = agent.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling...".yellow());
            token.cancel();
        }
    });

    let execution = agent.execute_task().await;
    ctrl_c.abort();
    // 关闭事件通道，等 reporter 打印完剩余事件
    drop(agent);
    let _ = reporter.await;

    println!("{}", format_execution(&execution));
    Ok(execution)
}

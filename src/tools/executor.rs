//! 工具执行器
//!
//! 持有本任务的 ToolSet 与单次调用超时，dispatch(calls) 对每个调用恰好产出一个 ToolResult，
//! 顺序与调用顺序一致；工具错误、panic、超时、未知工具都转为 status = -1 的结果，不向上抛出。
//! 每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::time::timeout;

use crate::llm::ToolCall;
use crate::tools::{ToolResult, ToolSet};

/// 工具执行器
pub struct ToolExecutor {
    tools: ToolSet,
    timeout: Duration,
    /// 对应 Provider 的 parallel_tool_calls
    allow_parallel: bool,
}

impl ToolExecutor {
    pub fn new(tools: ToolSet, timeout: Duration, allow_parallel: bool) -> Self {
        Self {
            tools,
            timeout,
            allow_parallel,
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// 执行一批调用；批内多于一个调用、允许并发且全部工具 parallel_safe 时并发执行
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if self.can_run_parallel(calls) {
            tracing::debug!(calls = calls.len(), "dispatching tool calls in parallel");
            join_all(calls.iter().map(|call| self.execute(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute(call).await);
            }
            results
        }
    }

    /// 名为 name 的工具是否表示任务完成
    pub fn signals_completion(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .is_some_and(|tool| tool.signals_completion())
    }

    fn can_run_parallel(&self, calls: &[ToolCall]) -> bool {
        calls.len() > 1
            && self.allow_parallel
            && calls.iter().all(|call| {
                self.tools
                    .get(&call.name)
                    .is_some_and(|tool| tool.parallel_safe())
            })
    }

    /// 执行单个调用；超时、工具错误、panic、未知工具均转为失败结果，并输出 JSON 审计日志
    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let (result, outcome) = match self.tools.get(&call.name) {
            None => {
                let msg = format!(
                    "Tool '{}' not found. Available tools: [{}]",
                    call.name,
                    self.tools.names().join(", ")
                );
                (ToolResult::failure(&call.id, &call.name, msg), "unknown_tool")
            }
            Some(tool) => {
                let fut = AssertUnwindSafe(tool.execute(&call.arguments)).catch_unwind();
                match timeout(self.timeout, fut).await {
                    Ok(Ok(Ok(exec))) => (ToolResult::from_exec(&call.id, &call.name, exec), "ok"),
                    Ok(Ok(Err(e))) => (
                        ToolResult::failure(&call.id, &call.name, format!("Error executing tool '{}': {}", call.name, e)),
                        "error",
                    ),
                    Ok(Err(panic)) => (
                        ToolResult::failure(
                            &call.id,
                            &call.name,
                            format!("Tool '{}' panicked: {}", call.name, panic_message(&*panic)),
                        ),
                        "panic",
                    ),
                    Err(_) => (
                        ToolResult::failure(
                            &call.id,
                            &call.name,
                            format!("Tool '{}' timed out after {}s", call.name, self.timeout.as_secs()),
                        ),
                        "timeout",
                    ),
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": result.success,
            "outcome": outcome,
            "status": result.status,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

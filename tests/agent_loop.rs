//! Agent 主循环集成测试：MockLlmClient + 测试内工具 + 静态 diff

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use codebee::config::AppConfig;
use codebee::core::{
    Agent, AgentBuilder, AgentError, AgentState, FailureKind, TaskOptions, BUDGET_EXCEEDED_MESSAGE,
};
use codebee::llm::{LlmError, LlmResponse, MockLlmClient, TokenUsage, ToolArguments, ToolCall};
use codebee::memory::Role;
use codebee::observability::TrajectoryRecorder;
use codebee::react::{AgentEvent, TASK_INCOMPLETE_MESSAGE};
use codebee::tools::{Tool, ToolError, ToolExecResult, ToolParameter, ToolRegistry};
use codebee::workspace::WorkspaceDiff;

const SRC_PATCH: &str = "diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1 +1 @@
-fn a() {}
+fn b() {}
";

const TEST_PATCH: &str = "diff --git a/tests/test_lib.py b/tests/test_lib.py
+assert True
";

/// 每次返回队列中的下一个 diff，最后一个重复使用
struct ScriptedDiff(Mutex<VecDeque<String>>);

impl ScriptedDiff {
    fn new(diffs: &[&str]) -> Arc<Self> {
        Arc::new(Self(Mutex::new(diffs.iter().map(|d| d.to_string()).collect())))
    }
}

#[async_trait]
impl WorkspaceDiff for ScriptedDiff {
    async fn diff(&self, _root: &Path, _base: Option<&str>) -> Result<String, AgentError> {
        let mut queue = self.0.lock().unwrap();
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text back"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter {
            name: "text".into(),
            param_type: "string".into(),
            description: "text to echo".into(),
            required: true,
            enum_values: None,
            items: None,
        }]
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("text is required".into()))?;
        Ok(ToolExecResult::ok(text))
    }
}

/// 执行时取消会话
struct CancelTool(Arc<OnceLock<CancellationToken>>);

#[async_trait]
impl Tool for CancelTool {
    fn name(&self) -> &str {
        "cancel"
    }

    fn description(&self) -> &str {
        "Cancel the session"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    async fn execute(&self, _args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        if let Some(token) = self.0.get() {
            token.cancel();
        }
        Ok(ToolExecResult::ok("cancelled"))
    }
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::with_builtin();
    registry.register("echo", |_| Arc::new(EchoTool) as Arc<dyn Tool>);
    registry
}

fn echo_call(id: &str, text: &str) -> ToolCall {
    ToolCall::new(id, "echo", json!({ "text": text }))
}

fn done_call(id: &str) -> ToolCall {
    ToolCall::new(id, "task_done", json!({}))
}

fn builder(llm: Arc<MockLlmClient>, differ: Arc<dyn WorkspaceDiff>) -> AgentBuilder {
    AgentBuilder::new(AppConfig::default())
        .llm(llm)
        .registry(registry())
        .differ(differ)
}

fn agent(llm: Arc<MockLlmClient>, max_steps: usize) -> Agent {
    builder(llm, ScriptedDiff::new(&[""]))
        .max_steps(max_steps)
        .build()
        .unwrap()
}

fn options(root: &Path) -> TaskOptions {
    TaskOptions::new(root, "The parser crashes on empty input").tools(["echo", "task_done"])
}

#[tokio::test]
async fn test_text_reply_completes_in_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::with_responses([
        LlmResponse::text("Fixed.").with_usage(TokenUsage::new(50, 10)),
    ]));
    let mut agent = agent(llm.clone(), 5);
    agent.new_task("fix parser", options(dir.path())).unwrap();

    let exec = agent.execute_task().await;
    assert!(exec.success);
    assert_eq!(exec.final_result.as_deref(), Some("Fixed."));
    assert_eq!(exec.steps.len(), 1);
    assert_eq!(exec.steps[0].state, AgentState::Completed);
    assert_eq!(exec.total_tokens, TokenUsage::new(50, 10));
    assert!(exec.failure.is_none());

    // 第一次请求：system + 任务消息，工具按请求顺序
    let requests = llm.requests();
    let req = &requests[0];
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, Role::System);
    assert!(req.messages[1].content.contains("The parser crashes on empty input"));
    assert_eq!(req.tool_names, vec!["echo", "task_done"]);
}

#[tokio::test]
async fn test_budget_exhaustion_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(
        MockLlmClient::new().with_fallback(
            LlmResponse::with_tool_calls("", vec![echo_call("c", "again")])
                .with_usage(TokenUsage::new(10, 2)),
        ),
    );
    let mut agent = agent(llm.clone(), 3);
    agent.new_task("loop forever", options(dir.path())).unwrap();

    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert_eq!(exec.steps.len(), 3);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(exec.final_result.as_deref(), Some(BUDGET_EXCEEDED_MESSAGE));
    assert_eq!(exec.failure.as_ref().unwrap().kind, FailureKind::BudgetExceeded);
    let numbers: Vec<usize> = exec.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let summed: TokenUsage = exec.steps.iter().map(|s| &s.usage).sum();
    assert_eq!(exec.total_tokens, summed);
    assert_eq!(exec.total_tokens, TokenUsage::new(30, 6));
}

#[tokio::test]
async fn test_one_result_per_call_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let calls = vec![
        echo_call("a", "one"),
        ToolCall::new("b", "missing_tool", json!({})),
        echo_call("c", "three"),
    ];
    let llm = Arc::new(MockLlmClient::with_responses([
        LlmResponse::with_tool_calls("", calls),
        LlmResponse::text("done"),
    ]));
    let mut agent = agent(llm.clone(), 5);
    agent.new_task("echo things", options(dir.path())).unwrap();

    let exec = agent.execute_task().await;
    assert!(exec.success);
    let first = &exec.steps[0];
    let ids: Vec<&str> = first.tool_results.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(first.tool_results[0].output.as_deref(), Some("one"));
    assert!(!first.tool_results[1].success);
    assert_eq!(first.tool_results[1].status, -1);
    assert!(first.tool_results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("missing_tool"));
    // 未知工具不终止步骤，默认反思模式针对失败给出提示
    assert_eq!(first.state, AgentState::Reflecting);
    assert!(first.reflection.as_deref().unwrap().contains("missing_tool"));

    // 第二次请求里三条工具消息紧跟助手消息，顺序与调用一致
    let requests = llm.requests();
    let second = &requests[1].messages;
    let tool_ids: Vec<&str> = second
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id())
        .collect();
    assert_eq!(tool_ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_must_patch_rejects_until_source_change() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::with_responses([
        LlmResponse::with_tool_calls("I am done", vec![done_call("d1")]),
        LlmResponse::with_tool_calls("", vec![done_call("d2")]),
    ]));
    let differ = ScriptedDiff::new(&["", SRC_PATCH]);
    let mut agent = builder(llm.clone(), differ).max_steps(5).build().unwrap();
    agent
        .new_task("fix parser", options(dir.path()).must_patch(true))
        .unwrap();

    let exec = agent.execute_task().await;
    assert!(exec.success);
    assert_eq!(exec.steps.len(), 2);
    assert_eq!(exec.steps[0].state, AgentState::Reflecting);
    assert_eq!(exec.steps[0].reflection.as_deref(), Some(TASK_INCOMPLETE_MESSAGE));
    assert_eq!(exec.steps[1].state, AgentState::Completed);
    // 回复文本为空时使用 task_done 的输出
    assert_eq!(exec.final_result.as_deref(), Some("Task done."));

    let requests = llm.requests();
    let second = &requests[1].messages;
    let last = second.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, TASK_INCOMPLETE_MESSAGE);
}

#[tokio::test]
async fn test_test_only_patch_is_not_enough() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::new().with_fallback(LlmResponse::text("done")));
    let mut agent = builder(llm, ScriptedDiff::new(&[TEST_PATCH]))
        .max_steps(2)
        .build()
        .unwrap();
    agent
        .new_task("fix parser", options(dir.path()).must_patch(true))
        .unwrap();

    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert_eq!(exec.steps.len(), 2);
    assert_eq!(exec.failure.unwrap().kind, FailureKind::BudgetExceeded);
}

#[tokio::test]
async fn test_default_tool_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(Arc::new(MockLlmClient::new()), 3);
    agent
        .new_task("fix", TaskOptions::new(dir.path(), "bug"))
        .unwrap();
    let names = agent.tool_names();
    assert_eq!(names.len(), 4);
    assert_eq!(
        names,
        vec!["bash", "str_replace_based_edit_tool", "sequentialthinking", "task_done"]
    );
}

#[tokio::test]
async fn test_failed_new_task_leaves_agent_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(Arc::new(MockLlmClient::new()), 3);
    agent.new_task("first task", options(dir.path())).unwrap();

    let err = agent
        .new_task("second", TaskOptions::new(dir.path(), "bug").tools(["nope"]))
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownTool { .. }));
    assert!(err.is_configuration_error());

    let err = agent
        .new_task(
            "second",
            TaskOptions {
                project_path: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingParameter("issue")));

    assert_eq!(agent.task().unwrap().description, "first task");
    assert_eq!(agent.tool_names(), vec!["echo", "task_done"]);
    assert_eq!(agent.conversation().unwrap().len(), 2);
}

#[tokio::test]
async fn test_execute_without_task() {
    let mut agent = agent(Arc::new(MockLlmClient::new()), 3);
    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert!(exec.steps.is_empty());
    assert_eq!(exec.failure.unwrap().kind, FailureKind::Configuration);
}

#[tokio::test]
async fn test_task_executes_only_once() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::new().with_fallback(LlmResponse::text("done")));
    let mut agent = agent(llm.clone(), 3);
    agent.new_task("fix", options(dir.path())).unwrap();

    assert!(agent.execute_task().await.success);
    let history = agent.conversation().unwrap().len();

    let again = agent.execute_task().await;
    assert!(!again.success);
    assert!(again.steps.is_empty());
    assert_eq!(again.failure.unwrap().kind, FailureKind::Configuration);
    assert_eq!(llm.call_count(), 1);
    assert_eq!(agent.conversation().unwrap().len(), history);

    agent.new_task("fix again", options(dir.path())).unwrap();
    assert!(agent.execute_task().await.success);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_empty_reply_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::with_responses([LlmResponse::text("")]));
    let mut agent = agent(llm, 5);
    agent.new_task("fix", options(dir.path())).unwrap();

    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert_eq!(exec.steps.len(), 1);
    assert_eq!(exec.steps[0].state, AgentState::Error);
    assert!(exec.steps[0].error.as_deref().unwrap().contains("empty reply"));
    assert_eq!(exec.failure.unwrap().kind, FailureKind::Provider);
}

#[tokio::test]
async fn test_provider_error_ends_task() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmClient::with_responses([LlmResponse::with_tool_calls(
        "",
        vec![echo_call("a", "x")],
    )]));
    llm.push_error(LlmError::Auth {
        status: 401,
        message: "invalid api key".into(),
    });
    let mut agent = agent(llm, 5);
    agent.new_task("fix", options(dir.path())).unwrap();

    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert_eq!(exec.steps.len(), 2);
    assert_eq!(exec.steps[1].state, AgentState::Error);
    assert!(exec.steps[1].error.as_deref().unwrap().contains("invalid api key"));
    assert_eq!(exec.failure.unwrap().kind, FailureKind::Provider);
}

#[tokio::test]
async fn test_cancellation_keeps_completed_steps() {
    let dir = tempfile::tempdir().unwrap();
    let slot: Arc<OnceLock<CancellationToken>> = Arc::new(OnceLock::new());
    let mut registry = registry();
    let tool_slot = Arc::clone(&slot);
    registry.register("cancel", move |_| {
        Arc::new(CancelTool(Arc::clone(&tool_slot))) as Arc<dyn Tool>
    });

    let llm = Arc::new(MockLlmClient::new().with_fallback(LlmResponse::with_tool_calls(
        "",
        vec![ToolCall::new("k", "cancel", json!({}))],
    )));
    let mut agent = AgentBuilder::new(AppConfig::default())
        .llm(llm.clone())
        .registry(registry)
        .differ(ScriptedDiff::new(&[""]))
        .max_steps(10)
        .build()
        .unwrap();
    slot.set(agent.cancel_token()).unwrap();
    agent
        .new_task("fix", TaskOptions::new(dir.path(), "bug").tools(["cancel"]))
        .unwrap();

    let exec = agent.execute_task().await;
    assert!(!exec.success);
    assert_eq!(exec.steps.len(), 2);
    assert_eq!(exec.steps[0].state, AgentState::Reflecting);
    assert_eq!(exec.steps[1].state, AgentState::Error);
    assert_eq!(exec.steps[1].error.as_deref(), Some("Cancelled by user"));
    assert_eq!(exec.failure.unwrap().kind, FailureKind::Cancelled);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_events_trajectory_and_patch_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let trajectory_path = out.path().join("trajectory.json");
    let patch_path = out.path().join("fix.patch");

    let llm = Arc::new(MockLlmClient::with_responses([
        LlmResponse::with_tool_calls("", vec![echo_call("a", "hi")]),
        LlmResponse::with_tool_calls("Patched the parser", vec![done_call("d")]),
    ]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut agent = builder(llm, ScriptedDiff::new(&[SRC_PATCH]))
        .trajectory(Arc::new(TrajectoryRecorder::new(Some(trajectory_path.clone()))))
        .events(tx)
        .max_steps(5)
        .build()
        .unwrap();
    agent
        .new_task("fix", options(dir.path()).patch_path(&patch_path))
        .unwrap();

    let exec = agent.execute_task().await;
    assert!(exec.success);
    assert_eq!(exec.final_result.as_deref(), Some("Patched the parser"));
    drop(agent);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(AgentEvent::TaskStarted { max_steps: 5, .. })));
    assert!(matches!(events.last(), Some(AgentEvent::TaskFinished { success: true, .. })));
    let recorded = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::StepRecorded { .. }))
        .count();
    assert_eq!(recorded, 2);

    assert_eq!(std::fs::read_to_string(&patch_path).unwrap(), SRC_PATCH);

    let trajectory: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&trajectory_path).unwrap()).unwrap();
    assert_eq!(trajectory["agent_steps"].as_array().unwrap().len(), 2);
    assert_eq!(trajectory["llm_interactions"].as_array().unwrap().len(), 4);
    assert_eq!(trajectory["task_info"]["max_steps"], 5);
    assert_eq!(trajectory["final_result"]["success"], true);
}

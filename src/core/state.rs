//! 状态定义：单步状态机标签、步骤记录与任务执行记录
//!
//! AgentStep 定稿后不再修改；Execution 在任务开始时创建，结束时恰好定稿一次。

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::llm::{LlmResponse, TokenUsage, ToolCall};
use crate::memory::Message;
use crate::tools::ToolResult;

/// 单步状态：THINKING → CALLING_TOOL → REFLECTING → COMPLETED | ERROR
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Thinking,
    CallingTool,
    Reflecting,
    Completed,
    Error,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Thinking => "thinking",
            AgentState::CallingTool => "calling_tool",
            AgentState::Reflecting => "reflecting",
            AgentState::Completed => "completed",
            AgentState::Error => "error",
        }
    }
}

/// 一步的完整记录
#[derive(Clone, Debug, Serialize)]
pub struct AgentStep {
    /// 从 1 开始，单调递增
    pub step_number: usize,
    pub state: AgentState,
    /// 本步发给模型的消息（trajectory 的 llm_interactions 已记录，故不重复序列化）
    #[serde(skip_serializing)]
    pub request_messages: Vec<Message>,
    pub llm_response: Option<LlmResponse>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub reflection: Option<String>,
    pub error: Option<String>,
    /// 本步消耗（含反思调用）
    pub usage: TokenUsage,
}

impl AgentStep {
    pub fn new(step_number: usize) -> Self {
        Self {
            step_number,
            state: AgentState::Thinking,
            request_messages: Vec::new(),
            llm_response: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            reflection: None,
            error: None,
            usage: TokenUsage::default(),
        }
    }
}

/// 任务失败分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Provider,
    BudgetExceeded,
    Cancelled,
    Workspace,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// 任务执行记录
#[derive(Clone, Debug, Serialize)]
pub struct Execution {
    pub id: Uuid,
    pub task: String,
    pub success: bool,
    pub final_result: Option<String>,
    pub steps: Vec<AgentStep>,
    pub total_tokens: TokenUsage,
    pub execution_time: Duration,
    pub failure: Option<ExecutionFailure>,
}

impl Execution {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            success: false,
            final_result: None,
            steps: Vec::new(),
            total_tokens: TokenUsage::default(),
            execution_time: Duration::ZERO,
            failure: None,
        }
    }

    /// 未能开始即失败（如未设置任务）
    pub fn failed(task: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            final_result: Some(message.clone()),
            failure: Some(ExecutionFailure { kind, message }),
            ..Self::new(task)
        }
    }

    pub fn last_step(&self) -> Option<&AgentStep> {
        self.steps.last()
    }
}

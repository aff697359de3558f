//! sequentialthinking 工具：记录模型的分步思考（可修订、可分支），不触碰工作区

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::ToolArguments;
use crate::tools::schema::{parameters_of, parse_args};
use crate::tools::{Tool, ToolError, ToolExecResult, ToolParameter};

const DESCRIPTION: &str = "A tool for dynamic and reflective problem-solving through thoughts.
Each thought can build on, question, or revise previous insights as understanding deepens.
* Break down complex problems into steps and plan with room for revision
* You can adjust total_thoughts up or down as you progress
* Mark thoughts that revise previous thinking with is_revision / revises_thought
* Branch into alternative approaches with branch_from_thought / branch_id
* Only set next_thought_needed to false when truly done and a satisfactory answer is reached
";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ThoughtArgs {
    /// Your current thinking step.
    thought: String,
    /// Whether another thought step is needed.
    next_thought_needed: bool,
    /// Current thought number (1-based).
    thought_number: u32,
    /// Estimated total thoughts needed.
    total_thoughts: u32,
    /// Whether this revises previous thinking.
    is_revision: Option<bool>,
    /// Which thought is being reconsidered.
    revises_thought: Option<u32>,
    /// Branching point thought number.
    branch_from_thought: Option<u32>,
    /// Branch identifier.
    branch_id: Option<String>,
    /// If reaching end but realizing more thoughts needed.
    needs_more_thoughts: Option<bool>,
}

#[derive(Debug, Default)]
struct ThinkingState {
    history: Vec<ThoughtArgs>,
    branches: BTreeMap<String, Vec<u32>>,
}

/// 分步思考工具；历史只在本任务内有效
#[derive(Debug, Default)]
pub struct SequentialThinkingTool {
    state: Mutex<ThinkingState>,
}

impl SequentialThinkingTool {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate(args: &mut ThoughtArgs) -> Result<(), ToolError> {
    if args.thought.trim().is_empty() {
        return Err(ToolError::InvalidArguments("thought must be a non-empty string".into()));
    }
    if args.thought_number < 1 || args.total_thoughts < 1 {
        return Err(ToolError::InvalidArguments(
            "thought_number and total_thoughts must be at least 1".into(),
        ));
    }
    if args.revises_thought == Some(0) || args.branch_from_thought == Some(0) {
        return Err(ToolError::InvalidArguments(
            "revises_thought and branch_from_thought must be at least 1".into(),
        ));
    }
    if args.thought_number > args.total_thoughts {
        args.total_thoughts = args.thought_number;
    }
    Ok(())
}

#[async_trait]
impl Tool for SequentialThinkingTool {
    fn name(&self) -> &str {
        "sequentialthinking"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        parameters_of::<ThoughtArgs>()
    }

    async fn execute(&self, args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        let mut thought: ThoughtArgs = parse_args(args)?;
        validate(&mut thought)?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let (Some(from), Some(branch)) = (thought.branch_from_thought, thought.branch_id.clone()) {
            state.branches.entry(branch).or_default().push(from);
        }
        let status = serde_json::json!({
            "thought_number": thought.thought_number,
            "total_thoughts": thought.total_thoughts,
            "next_thought_needed": thought.next_thought_needed,
            "branches": state.branches.keys().collect::<Vec<_>>(),
            "thought_history_length": state.history.len() + 1,
        });
        tracing::debug!(
            thought_number = thought.thought_number,
            total = thought.total_thoughts,
            revision = thought.is_revision.unwrap_or(false),
            "sequential thought"
        );
        state.history.push(thought);

        let output = serde_json::to_string_pretty(&status)
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolExecResult::ok(format!(
            "Sequential thinking step completed.\n\nStatus:\n{output}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn think(tool: &SequentialThinkingTool, v: serde_json::Value) -> Result<ToolExecResult, ToolError> {
        tool.execute(v.as_object().unwrap()).await
    }

    #[tokio::test]
    async fn test_history_and_branches() {
        let tool = SequentialThinkingTool::new();
        think(&tool, json!({"thought": "reproduce", "next_thought_needed": true, "thought_number": 1, "total_thoughts": 2}))
            .await
            .unwrap();
        let out = think(
            &tool,
            json!({"thought": "alt", "next_thought_needed": true, "thought_number": 3, "total_thoughts": 2,
                   "branch_from_thought": 1, "branch_id": "b1"}),
        )
        .await
        .unwrap()
        .output
        .unwrap();
        assert!(out.contains("\"thought_history_length\": 2"));
        assert!(out.contains("\"total_thoughts\": 3"));
        assert!(out.contains("b1"));
    }

    #[tokio::test]
    async fn test_rejects_empty_thought() {
        let tool = SequentialThinkingTool::new();
        let res = think(&tool, json!({"thought": " ", "next_thought_needed": false, "thought_number": 1, "total_thoughts": 1})).await;
        assert!(matches!(res, Err(ToolError::InvalidArguments(_))));
    }
}

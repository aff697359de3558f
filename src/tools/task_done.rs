//! task_done 工具：模型声明任务完成；是否真正完成由 CompletionEvaluator 判定

use async_trait::async_trait;

use crate::llm::ToolArguments;
use crate::tools::{Tool, ToolError, ToolExecResult, ToolParameter};

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskDoneTool;

#[async_trait]
impl Tool for TaskDoneTool {
    fn name(&self) -> &str {
        "task_done"
    }

    fn description(&self) -> &str {
        "Report the completion of the task. Note that you cannot call this tool before any verification is done. You can write reproduce / test scripts to verify your solution."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn signals_completion(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        Ok(ToolExecResult::ok("Task done."))
    }
}

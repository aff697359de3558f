//! Agent 错误类型
//!
//! 按传播策略分组：配置类错误在任何步骤开始前即失败；LLM 错误终止任务；
//! 工具错误在分发器边界被转换为 ToolResult，永远不会终止任务。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误（配置、工具、LLM、预算、取消）
#[derive(Error, Debug)]
pub enum AgentError {
    /// new_task 缺少必需参数（project_path / issue）
    #[error("Missing required task parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Unknown tool '{name}'. Available tools: {available}")]
    UnknownTool { name: String, available: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 尚未调用 new_task，或当前任务已执行过
    #[error("No task has been set up; call new_task first")]
    NoTask,

    /// 工作区不存在或不是版本库（diff 协作方报告）
    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Task execution exceeded maximum steps ({0}) without completion")]
    BudgetExceeded(usize),

    #[error("Cancelled by user")]
    Cancelled,
}

impl AgentError {
    /// 是否属于配置类错误（任务参数、工具名、配置文件、工作区）
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AgentError::MissingParameter(_)
                | AgentError::InvalidTask(_)
                | AgentError::UnknownTool { .. }
                | AgentError::ConfigError(_)
                | AgentError::NoTask
                | AgentError::Workspace(_)
        )
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(AgentError::MissingParameter("issue").is_configuration_error());
        assert!(AgentError::UnknownTool {
            name: "x".into(),
            available: "bash".into()
        }
        .is_configuration_error());
        assert!(!AgentError::Cancelled.is_configuration_error());
        assert!(!AgentError::BudgetExceeded(3).is_configuration_error());
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: AgentError = LlmError::Network("connection reset".into()).into();
        assert!(matches!(err, AgentError::LlmError(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}

//! 核心编排层：错误、状态、任务定义、会话监管、Agent 构建与主控循环

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;
pub mod task;

pub use builder::AgentBuilder;
pub use error::AgentError;
pub use orchestrator::{Agent, BUDGET_EXCEEDED_MESSAGE};
pub use session_supervisor::SessionSupervisor;
pub use state::{AgentState, AgentStep, Execution, ExecutionFailure, FailureKind};
pub use task::{Task, TaskOptions};

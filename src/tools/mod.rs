//! 工具层：注册表、参数 Schema、执行器与内置工具

pub mod bash;
pub mod edit;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod sequential_thinking;
pub mod task_done;

pub use bash::BashTool;
pub use edit::EditTool;
pub use executor::ToolExecutor;
pub use registry::{
    Tool, ToolContext, ToolError, ToolExecResult, ToolParameter, ToolRegistry, ToolResult,
    ToolSchema, ToolSet, DEFAULT_TOOLS,
};
pub use schema::{parameters_of, parse_args};
pub use sequential_thinking::SequentialThinkingTool;
pub use task_done::TaskDoneTool;

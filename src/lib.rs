//! codebee - Rust 自主编码智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（配置文件 + 环境变量），各 Provider 模型参数
//! - **core**: Agent 编排、任务定义、步骤与执行记录、会话监管、错误
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Anthropic / 重试 / Mock）
//! - **memory**: 任务对话历史
//! - **observability**: tracing 初始化与执行轨迹记录
//! - **react**: 单步状态机、完成判定与测试补丁过滤、反思、提示词
//! - **tools**: 工具注册表、执行器与内置工具（bash、编辑、顺序思考、task_done）
//! - **ui**: 命令行、控制台输出与交互模式
//! - **workspace**: 工作区 diff（git）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod ui;
pub mod workspace;

pub use crate::core::{Agent, AgentBuilder, AgentError, Execution, TaskOptions};

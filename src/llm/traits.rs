//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Anthropic / Mock）实现 LlmClient：发送完整对话与工具 Schema，
//! 返回助手消息（文本 + 结构化工具调用）及 Token 用量。每次调用无状态。

use async_trait::async_trait;

use crate::config::ModelParameters;
use crate::llm::{LlmError, LlmResponse};
use crate::memory::Message;
use crate::tools::ToolSchema;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 一次对话补全；空回复原样返回，不做填充
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<LlmResponse, LlmError>;

    /// 后端名称，用于日志
    fn name(&self) -> &str {
        "llm"
    }
}

//! LLM 层：客户端抽象、Provider 分发与实现（OpenAI 兼容 / Anthropic / Mock）

pub mod anthropic;
pub mod error;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod traits;
pub mod types;

pub use anthropic::AnthropicClient;
pub use error::LlmError;
pub use mock::{MockLlmClient, RecordedRequest};
pub use openai::OpenAiClient;
pub use provider::{create_llm_client, Provider};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::LlmClient;
pub use types::{LlmResponse, TokenUsage, ToolArguments, ToolCall};

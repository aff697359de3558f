//! Provider 分发：封闭的后端枚举 + 客户端工厂
//!
//! 引擎只依赖 LlmClient trait；具体后端在此按 Provider 选择，并统一包一层 RetryingLlmClient。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ModelParameters;
use crate::llm::{AnthropicClient, LlmClient, LlmError, OpenAiClient, RetryConfig, RetryingLlmClient};

/// 支持的模型后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Azure,
    OpenRouter,
    Doubao,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Azure,
        Provider::OpenRouter,
        Provider::Doubao,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Azure => "azure",
            Provider::OpenRouter => "openrouter",
            Provider::Doubao => "doubao",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Provider::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<&str> = Provider::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown provider '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// 按 Provider 创建客户端，外层包重试（次数取 params.max_retries）
pub fn create_llm_client(
    provider: Provider,
    params: &ModelParameters,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    let inner: Arc<dyn LlmClient> = match provider {
        Provider::Anthropic => Arc::new(AnthropicClient::new(params)?),
        Provider::OpenAi
        | Provider::Azure
        | Provider::OpenRouter
        | Provider::Doubao
        | Provider::Ollama => Arc::new(OpenAiClient::new(provider, params)?),
    };
    let retry = RetryConfig {
        max_retries: params.max_retries,
        ..RetryConfig::default()
    };
    Ok(Arc::new(RetryingLlmClient::new(inner, retry)))
}

//! 带重试的 LLM 客户端包装
//!
//! 仅对 `LlmError::is_retryable()` 的错误重试；指数退避，限流时优先使用服务端给出的 retry_after。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ModelParameters;
use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::Message;
use crate::tools::ToolSchema;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let Some(hint) = err.retry_after() {
            return hint.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 包装任意 LlmClient，对可重试错误自动重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<LlmResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.chat(messages, tools, params).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.delay_for(attempt, &err);
                    warn!(
                        backend = self.inner.name(),
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

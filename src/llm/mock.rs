//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预设回复或错误；脚本耗尽后使用可选的兜底回复（可无限重复）。
//! 每次请求的消息与工具名都会被记录，便于断言引擎发出的内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::ModelParameters;
use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::Message;
use crate::tools::ToolSchema;

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    fallback: Option<LlmResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定回复
    pub fn with_responses(responses: impl IntoIterator<Item = LlmResponse>) -> Self {
        let mock = Self::new();
        for resp in responses {
            mock.push_response(resp);
        }
        mock
    }

    /// 脚本耗尽后每次都返回该回复
    pub fn with_fallback(mut self, response: LlmResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn push_response(&self, response: LlmResponse) {
        self.lock_script().push_back(Ok(response));
    }

    pub fn push_error(&self, error: LlmError) {
        self.lock_script().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock_requests().clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<LlmResponse, LlmError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        _params: &ModelParameters,
    ) -> Result<LlmResponse, LlmError> {
        self.lock_requests().push(RecordedRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        match self.lock_script().pop_front() {
            Some(next) => next,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse("mock script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockLlmClient::with_responses([LlmResponse::text("first")])
            .with_fallback(LlmResponse::text("again"));
        let params = ModelParameters::defaults_for(Provider::OpenAi);
        let msgs = [Message::user("hi")];
        assert_eq!(mock.chat(&msgs, &[], &params).await.unwrap().content, "first");
        assert_eq!(mock.chat(&msgs, &[], &params).await.unwrap().content, "again");
        assert_eq!(mock.chat(&msgs, &[], &params).await.unwrap().content, "again");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests()[0].messages[0].content, "hi");
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback() {
        let mock = MockLlmClient::new();
        let params = ModelParameters::defaults_for(Provider::OpenAi);
        assert!(mock.chat(&[], &[], &params).await.is_err());
    }
}

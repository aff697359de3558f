//! LLM 调用错误分类
//!
//! 按 HTTP 状态与传输层错误归类，供 RetryingLlmClient 判断是否值得重试。

use std::time::Duration;

use thiserror::Error;

/// Provider 调用失败的原因
#[derive(Error, Debug)]
pub enum LlmError {
    /// 401/403：API Key 错误或无权限
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// 429：限流，可能带有建议等待时间
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// 其它非 2xx 响应
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// 响应无法解析或缺少必需字段
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// 缺少 API Key / base_url 等
    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl LlmError {
    /// 根据 HTTP 状态码与响应体归类
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate_body(body);
        match status {
            401 | 403 => LlmError::Auth { status, message },
            429 => LlmError::RateLimited {
                retry_after: extract_retry_after(body),
                message,
            },
            _ => LlmError::Api { status, message },
        }
    }

    /// 2xx 但既无文本也无工具调用的回复
    pub fn empty_reply(finish_reason: Option<&str>) -> Self {
        LlmError::InvalidResponse(format!(
            "empty reply: no content and no tool calls (finish_reason: {})",
            finish_reason.unwrap_or("none")
        ))
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }

    /// 限流、超时、网络错误与 5xx 值得用同样的请求重试
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Timeout(_) | LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// 兼容 {"error": {"retry_after": 5}} 与 {"retry_after": 5}（整数或浮点秒）
fn extract_retry_after(body: &str) -> Option<Duration> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = v["error"]["retry_after"]
        .as_f64()
        .or_else(|| v["retry_after"].as_f64())?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 300;
    if body.chars().count() > MAX_CHARS {
        format!("{}...", body.chars().take(MAX_CHARS).collect::<String>())
    } else {
        body.to_string()
    }
}

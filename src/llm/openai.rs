//! OpenAI Chat Completions 兼容客户端
//!
//! 覆盖 openai / openrouter / doubao / ollama（按 Provider 选默认 base_url）与 azure（部署 URL + api-version）。
//! 请求体用 serde_json 拼装，响应用带 Option 字段的结构体解析，容忍各家兼容实现的缺省字段。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ModelParameters;
use crate::llm::{LlmClient, LlmError, LlmResponse, Provider, TokenUsage, ToolArguments, ToolCall};
use crate::memory::{Message, Role};
use crate::tools::ToolSchema;

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client,
    provider: Provider,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(provider: Provider, params: &ModelParameters) -> Result<Self, LlmError> {
        let base_url = params
            .base_url
            .clone()
            .or_else(|| default_base_url(provider).map(String::from))
            .ok_or_else(|| LlmError::Config(format!("{provider}: base_url is required")))?;
        let api_key = match (&params.api_key, provider) {
            (Some(key), _) if !key.is_empty() => key.clone(),
            // 本地 ollama 不校验 key
            (_, Provider::Ollama) => "ollama".to_string(),
            _ => {
                return Err(LlmError::Config(format!(
                    "{provider}: api_key is not set (config file or environment)"
                )))
            }
        };
        if provider == Provider::Azure && params.api_version.is_none() {
            return Err(LlmError::Config("azure: api_version is required".into()));
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, params: &ModelParameters) -> String {
        match self.provider {
            Provider::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url,
                params.model,
                params.api_version.as_deref().unwrap_or_default()
            ),
            _ => format!("{}/chat/completions", self.base_url),
        }
    }
}

fn default_base_url(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAi => Some("https://api.openai.com/v1"),
        Provider::OpenRouter => Some("https://openrouter.ai/api/v1"),
        Provider::Doubao => Some("https://ark.cn-beijing.volces.com/api/v3"),
        Provider::Ollama => Some("http://localhost:11434/v1"),
        Provider::Azure | Provider::Anthropic => None,
    }
}

/// 对话 → Chat Completions messages
pub(crate) fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant if msg.tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": msg.content })
            }
            Role::Assistant => {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(msg.content.clone())
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id().unwrap_or_default(),
                "content": msg.content,
            }),
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema(),
                }
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// 参数字符串解析为对象；非法 JSON 记 warn 后按空参数处理，由工具自己报缺参
fn parse_arguments(tool: &str, raw: Option<&str>) -> ToolArguments {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return ToolArguments::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(tool, arguments = raw, "tool call arguments are not a JSON object");
            ToolArguments::new()
        }
    }
}

fn parse_completion(body: &str) -> Result<LlmResponse, LlmError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("malformed completion: {e}")))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            arguments: parse_arguments(&tc.function.name, tc.function.arguments.as_deref()),
            name: tc.function.name,
        })
        .collect::<Vec<_>>();
    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() && tool_calls.is_empty() {
        return Err(LlmError::empty_reply(choice.finish_reason.as_deref()));
    }
    Ok(LlmResponse {
        content,
        tool_calls,
        usage: completion
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        model: completion.model,
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<LlmResponse, LlmError> {
        let mut body = json!({
            "model": params.model,
            "messages": to_wire_messages(messages),
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
        });
        if !tools.is_empty() {
            body["tools"] = json!(to_wire_tools(tools));
            if params.parallel_tool_calls {
                body["parallel_tool_calls"] = json!(true);
            }
        }

        let url = self.endpoint(params);
        debug!(provider = %self.provider, model = %params.model, url = %url, tools = tools.len(), "chat request");

        let mut request = self.client.post(&url).json(&body);
        request = match self.provider {
            Provider::Azure => request.header("api-key", &self.api_key),
            _ => request.bearer_auth(&self.api_key),
        };
        let resp = request.send().await.map_err(|e| LlmError::from_reqwest(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::from_reqwest(&e))?;
        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &text));
        }
        parse_completion(&text)
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }
}

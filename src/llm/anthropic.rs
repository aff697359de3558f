//! Anthropic Messages API 客户端
//!
//! system 消息提到顶层 `system` 字段；工具调用与结果分别转为 tool_use / tool_result 块；
//! Messages API 要求 user / assistant 交替，故相邻同角色消息合并为一条。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ModelParameters;
use crate::llm::{LlmClient, LlmError, LlmResponse, TokenUsage, ToolArguments, ToolCall};
use crate::memory::{Message, Role};
use crate::tools::ToolSchema;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(params: &ModelParameters) -> Result<Self, LlmError> {
        let api_key = params
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("anthropic: api_key is not set".into()))?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;
        let base_url = params
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

/// 拆出 system prompt，其余消息转为 Anthropic 内容块并合并相邻同角色消息
pub(crate) fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut converted: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for msg in messages {
        let (role, blocks) = match msg.role {
            Role::System => {
                match system.as_mut() {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system = Some(msg.content.clone()),
                }
                continue;
            }
            Role::User => ("user", text_block(&msg.content)),
            Role::Assistant => {
                let mut blocks = text_block(&msg.content);
                blocks.extend(msg.tool_calls.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": Value::Object(call.arguments.clone()),
                    })
                }));
                ("assistant", blocks)
            }
            Role::Tool => {
                let is_error = msg.tool_result.as_ref().is_some_and(|r| !r.success);
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id().unwrap_or_default(),
                    "content": msg.content,
                    "is_error": is_error,
                });
                ("user", vec![block])
            }
        };
        if blocks.is_empty() {
            continue;
        }
        match converted.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => converted.push((role, blocks)),
        }
    }

    let messages = converted
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect();
    (system, messages)
}

fn text_block(text: &str) -> Vec<Value> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![json!({ "type": "text", "text": text })]
    }
}

fn to_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn parse_response(body: &str) -> Result<LlmResponse, LlmError> {
    let resp: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("malformed messages response: {e}")))?;
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in resp.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Object(map) => map,
                    _ => ToolArguments::new(),
                };
                let id = if id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    id
                };
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
            ContentBlock::Other => {}
        }
    }
    if content.trim().is_empty() && tool_calls.is_empty() {
        return Err(LlmError::empty_reply(resp.stop_reason.as_deref()));
    }
    Ok(LlmResponse {
        content,
        tool_calls,
        usage: resp
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        model: resp.model,
        finish_reason: resp.stop_reason,
    })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        params: &ModelParameters,
    ) -> Result<LlmResponse, LlmError> {
        let (system, converted) = convert_messages(messages);
        let mut body = json!({
            "model": params.model,
            "max_tokens": params.max_tokens,
            "messages": converted,
            "temperature": params.temperature,
            "top_p": params.top_p,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(to_wire_tools(tools));
        }
        if params.top_k > 0 {
            body["top_k"] = json!(params.top_k);
        }

        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %params.model, url = %url, tools = tools.len(), "anthropic chat request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::from_reqwest(&e))?;
        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &text));
        }
        parse_response(&text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

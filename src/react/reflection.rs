//! 工具执行后的反思
//!
//! 三种模式：off 不反思；tool_errors（默认）只针对失败的工具生成提示，不调用模型；
//! model 额外请求一次模型，总结最近的工具结果并规划下一步。反思只是建议，模型调用失败时跳过。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::tools::ToolResult;

/// 模型反思时追加的请求
const MODEL_REFLECTION_PROMPT: &str = "Reflect on the results of the tool calls above. \
Briefly summarize what they show, note anything that went wrong, and state the next action you will take. \
Do not call any tools in this reply.";

/// 模型反思写回对话时的前缀
pub const REFLECTION_PREFIX: &str = "Reflection on the previous step:\n";

/// 反思模式（配置项 `reflection`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionMode {
    Off,
    #[default]
    ToolErrors,
    Model,
}

/// 反思生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct Reflector {
    mode: ReflectionMode,
}

impl Reflector {
    pub fn new(mode: ReflectionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ReflectionMode {
        self.mode
    }

    /// 每个失败工具一行：工具名 + 错误
    pub fn tool_error_reflection(&self, results: &[ToolResult]) -> Option<String> {
        let lines: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                let error = r
                    .error
                    .as_deref()
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .unwrap_or_else(|| format!("exit status {}", r.status));
                format!(
                    "The tool '{}' execution failed with error: {}. Consider trying a different approach or fixing the parameters.",
                    r.name, error
                )
            })
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    /// model 模式下发给模型的消息：当前对话 + 反思请求
    pub fn reflection_request(&self, conversation: &[Message]) -> Vec<Message> {
        let mut messages = conversation.to_vec();
        messages.push(Message::user(MODEL_REFLECTION_PROMPT));
        messages
    }

    /// 模型返回的反思文本；空文本视为无反思
    pub fn model_reflection(&self, reply: &str) -> Option<String> {
        let text = reply.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// 写回对话的用户消息
    pub fn reflection_message(&self, reflection: &str) -> Message {
        match self.mode {
            ReflectionMode::Model => Message::user(format!("{REFLECTION_PREFIX}{reflection}")),
            _ => Message::user(reflection),
        }
    }
}

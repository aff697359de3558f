//! 单步状态机：THINKING → CALLING_TOOL → REFLECTING → COMPLETED | ERROR
//!
//! 每次 run 驱动一步并返回定稿的 AgentStep 与转移结果，由编排器决定是否继续。
//! 所有挂起点（模型调用、工具执行、工作区 diff）都与取消令牌竞争。

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::ModelParameters;
use crate::core::{AgentError, AgentState, AgentStep};
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Conversation, Message};
use crate::observability::TrajectorySink;
use crate::react::{CompletionEvaluator, CompletionVerdict, ReflectionMode, Reflector};
use crate::tools::{ToolExecutor, ToolResult, ToolSchema};

/// 一步结束后的转移
#[derive(Debug)]
pub enum StepTransition {
    /// 非终止，进入下一步
    Continue,
    /// 任务完成，携带最终结果
    Completed(String),
    /// 终止性错误（模型失败、取消、工作区错误）
    Failed(AgentError),
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: AgentStep,
    pub transition: StepTransition,
}

/// 单步执行所需的协作方（均为借用，由编排器持有）
pub struct StepRunner<'a> {
    pub llm: &'a dyn LlmClient,
    pub params: &'a ModelParameters,
    pub executor: &'a ToolExecutor,
    pub evaluator: &'a CompletionEvaluator,
    pub reflector: Reflector,
    pub schemas: &'a [ToolSchema],
    pub trajectory: Option<&'a dyn TrajectorySink>,
    pub cancel: &'a CancellationToken,
}

impl StepRunner<'_> {
    /// 执行第 step_number 步；对话在原地追加
    pub async fn run(&self, step_number: usize, conversation: &mut Conversation) -> StepOutcome {
        let mut step = AgentStep::new(step_number);
        let transition = match self.drive(&mut step, conversation).await {
            Ok(transition) => transition,
            Err(e) => {
                tracing::warn!(step = step_number, error = %e, "step failed");
                step.state = AgentState::Error;
                step.error = Some(e.to_string());
                StepTransition::Failed(e)
            }
        };
        if let Some(sink) = self.trajectory {
            sink.record_step(&step);
        }
        StepOutcome { step, transition }
    }

    async fn drive(
        &self,
        step: &mut AgentStep,
        conversation: &mut Conversation,
    ) -> Result<StepTransition, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // THINKING
        step.request_messages = conversation.messages().to_vec();
        if let Some(sink) = self.trajectory {
            sink.record_llm_request(conversation.messages(), self.schemas);
        }
        tracing::debug!(
            step = step.step_number,
            messages = conversation.len(),
            tools = self.schemas.len(),
            "calling model"
        );
        let response = self
            .cancellable(self.llm.chat(conversation.messages(), self.schemas, self.params))
            .await?;
        if let Some(sink) = self.trajectory {
            sink.record_llm_response(&response);
        }
        step.usage += response.usage.unwrap_or_default();
        step.llm_response = Some(response.clone());

        // 空回复不能被当作完成
        if !response.has_tool_calls() && response.content.trim().is_empty() {
            return Err(LlmError::empty_reply(response.finish_reason.as_deref()).into());
        }

        if !response.has_tool_calls() {
            conversation.push(Message::assistant(&response.content));
            return match self.cancellable(self.evaluator.evaluate()).await? {
                CompletionVerdict::Accepted => {
                    step.state = AgentState::Completed;
                    Ok(StepTransition::Completed(response.content))
                }
                CompletionVerdict::Rejected(reason) => {
                    conversation.push(Message::user(reason));
                    Ok(StepTransition::Continue)
                }
            };
        }

        // CALLING_TOOL
        step.state = AgentState::CallingTool;
        step.tool_calls = response.tool_calls.clone();
        conversation.push(Message::assistant_with_calls(
            &response.content,
            response.tool_calls.clone(),
        ));
        let results = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                // 每个 tool_call 仍需一条结果，历史才保持合法
                let reason = AgentError::Cancelled.to_string();
                conversation.extend(
                    response
                        .tool_calls
                        .iter()
                        .map(|call| Message::tool(ToolResult::failure(&call.id, &call.name, &reason))),
                );
                return Err(AgentError::Cancelled);
            }
            results = self.executor.dispatch(&response.tool_calls) => results,
        };
        conversation.extend(results.iter().cloned().map(Message::tool));

        let done = results
            .iter()
            .find(|r| r.success && self.executor.signals_completion(&r.name));
        if let Some(done) = done {
            let done_output = done.output.clone().unwrap_or_default();
            step.tool_results = results;
            return match self.cancellable(self.evaluator.evaluate()).await? {
                CompletionVerdict::Accepted => {
                    step.state = AgentState::Completed;
                    let result = if response.content.trim().is_empty() {
                        done_output
                    } else {
                        response.content
                    };
                    Ok(StepTransition::Completed(result))
                }
                CompletionVerdict::Rejected(reason) => {
                    step.state = AgentState::Reflecting;
                    conversation.push(Message::user(&reason));
                    step.reflection = Some(reason);
                    Ok(StepTransition::Continue)
                }
            };
        }
        step.tool_results = results;

        // REFLECTING
        self.reflect(step, conversation).await?;
        Ok(StepTransition::Continue)
    }

    async fn reflect(
        &self,
        step: &mut AgentStep,
        conversation: &mut Conversation,
    ) -> Result<(), AgentError> {
        let reflection = match self.reflector.mode() {
            ReflectionMode::Off => return Ok(()),
            ReflectionMode::ToolErrors => self.reflector.tool_error_reflection(&step.tool_results),
            ReflectionMode::Model => {
                let request = self.reflector.reflection_request(conversation.messages());
                match self.cancellable(self.llm.chat(&request, &[], self.params)).await {
                    Ok(reply) => {
                        step.usage += reply.usage.unwrap_or_default();
                        self.reflector.model_reflection(&reply.content)
                    }
                    Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(e) => {
                        tracing::warn!(step = step.step_number, error = %e, "reflection skipped");
                        None
                    }
                }
            }
        };
        step.state = AgentState::Reflecting;
        if let Some(text) = reflection {
            conversation.push(self.reflector.reflection_message(&text));
            step.reflection = Some(text);
        }
        Ok(())
    }

    async fn cancellable<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, AgentError>
    where
        E: Into<AgentError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            result = fut => result.map_err(Into::into),
        }
    }
}

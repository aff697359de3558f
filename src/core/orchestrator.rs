//! Agent 编排器：任务生命周期
//!
//! new_task 校验参数、解析工具集并播种对话；execute_task 从第 1 步驱动单步状态机，
//! 直到终止状态、取消或步数预算耗尽，然后写补丁、定稿轨迹并返回 Execution。
//! execute_task 从不返回错误：所有失败都折叠进 Execution.failure。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::ModelParameters;
use crate::core::{
    AgentError, Execution, ExecutionFailure, FailureKind, SessionSupervisor, Task, TaskOptions,
};
use crate::llm::{LlmClient, Provider};
use crate::memory::Conversation;
use crate::observability::{TaskInfo, TrajectorySink};
use crate::react::{
    task_message, AgentEvent, CompletionEvaluator, ReflectionMode, Reflector, StepRunner,
    StepTransition, SYSTEM_PROMPT,
};
use crate::tools::{ToolContext, ToolExecutor, ToolRegistry, ToolSchema};
use crate::workspace::WorkspaceDiff;

/// 步数耗尽时的最终结果
pub const BUDGET_EXCEEDED_MESSAGE: &str = "Task execution exceeded maximum steps without completion.";

/// 分发器外层超时比工具自身超时多出的余量，让工具先报告自己的超时
const OUTER_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// 当前任务的运行状态（new_task 成功后整体替换）
struct ActiveTask {
    task: Task,
    /// 已执行过：对话与轨迹都已定稿，不能再次执行
    finished: bool,
    conversation: Conversation,
    executor: ToolExecutor,
    evaluator: CompletionEvaluator,
    schemas: Vec<ToolSchema>,
    cancel: CancellationToken,
}

/// 自主编码 Agent
pub struct Agent {
    pub(crate) provider: Provider,
    pub(crate) params: ModelParameters,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) registry: ToolRegistry,
    pub(crate) differ: Arc<dyn WorkspaceDiff>,
    pub(crate) trajectory: Option<Arc<dyn TrajectorySink>>,
    pub(crate) events: Option<UnboundedSender<AgentEvent>>,
    pub(crate) supervisor: SessionSupervisor,
    pub(crate) max_steps: usize,
    pub(crate) reflection: ReflectionMode,
    pub(crate) tool_timeout: Duration,
    active: Option<ActiveTask>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        provider: Provider,
        params: ModelParameters,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        differ: Arc<dyn WorkspaceDiff>,
        trajectory: Option<Arc<dyn TrajectorySink>>,
        events: Option<UnboundedSender<AgentEvent>>,
        max_steps: usize,
        reflection: ReflectionMode,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            params,
            llm,
            registry,
            differ,
            trajectory,
            events,
            supervisor: SessionSupervisor::new(),
            max_steps,
            reflection,
            tool_timeout,
            active: None,
        }
    }

    /// 设置新任务；失败时 Agent 保持原状
    pub fn new_task(
        &mut self,
        description: impl Into<String>,
        options: TaskOptions,
    ) -> Result<(), AgentError> {
        let task = Task::new(description, options)?;
        let ctx = ToolContext::new(task.project_path.clone(), self.tool_timeout);
        let tools = self.registry.resolve(task.tool_names.as_deref(), &ctx)?;

        let schemas = tools.schemas();
        let tool_names = tools.names();
        let executor = ToolExecutor::new(
            tools,
            self.tool_timeout + OUTER_TIMEOUT_GRACE,
            self.params.parallel_tool_calls,
        );
        let evaluator = CompletionEvaluator::new(
            task.must_patch,
            task.project_path.clone(),
            task.base_commit.clone(),
            Arc::clone(&self.differ),
        );
        let conversation = Conversation::seeded(
            SYSTEM_PROMPT,
            task_message(&task.project_path, &task.issue, &task.description),
        );

        if let Some(sink) = &self.trajectory {
            sink.start_recording(&TaskInfo {
                task: task.description.clone(),
                provider: self.provider.to_string(),
                model: self.params.model.clone(),
                max_steps: self.max_steps,
                project_path: task.project_path.clone(),
                must_patch: task.must_patch,
                tools: tool_names.clone(),
            });
        }
        tracing::info!(
            project = %task.project_path.display(),
            must_patch = task.must_patch,
            tools = ?tool_names,
            "task created"
        );

        self.active = Some(ActiveTask {
            task,
            finished: false,
            conversation,
            executor,
            evaluator,
            schemas,
            cancel: self.supervisor.child_token(),
        });
        Ok(())
    }

    /// 执行当前任务；每个任务只能执行一次，再次执行需先调用 new_task
    pub async fn execute_task(&mut self) -> Execution {
        let mut active = match self.active.take() {
            Some(active) if !active.finished => active,
            other => {
                self.active = other;
                let err = AgentError::NoTask;
                tracing::warn!("{err}");
                return Execution::failed("", FailureKind::Configuration, err.to_string());
            }
        };
        let execution = self.run_task(&mut active).await;
        active.finished = true;
        self.active = Some(active);
        execution
    }

    async fn run_task(&self, active: &mut ActiveTask) -> Execution {
        let started = Instant::now();
        let mut execution = Execution::new(active.task.description.clone());
        tracing::info!(id = %execution.id, max_steps = self.max_steps, "task started");
        self.publish(AgentEvent::TaskStarted {
            task: execution.task.clone(),
            max_steps: self.max_steps,
        });

        let runner = StepRunner {
            llm: self.llm.as_ref(),
            params: &self.params,
            executor: &active.executor,
            evaluator: &active.evaluator,
            reflector: Reflector::new(self.reflection),
            schemas: &active.schemas,
            trajectory: self.trajectory.as_deref(),
            cancel: &active.cancel,
        };

        let mut outcome: Option<Result<String, AgentError>> = None;
        for step_number in 1..=self.max_steps {
            self.publish(AgentEvent::StepStarted {
                step_number,
                max_steps: self.max_steps,
            });
            let result = runner.run(step_number, &mut active.conversation).await;
            let step = result.step;
            execution.total_tokens += step.usage;
            tracing::info!(step = step_number, state = step.state.as_str(), "step recorded");
            self.publish(AgentEvent::StepRecorded {
                step: Box::new(step.clone()),
            });
            execution.steps.push(step);

            match result.transition {
                StepTransition::Continue => {}
                StepTransition::Completed(final_result) => {
                    outcome = Some(Ok(final_result));
                    break;
                }
                StepTransition::Failed(err) => {
                    outcome = Some(Err(err));
                    break;
                }
            }
        }

        match outcome {
            Some(Ok(final_result)) => {
                execution.success = true;
                execution.final_result = Some(final_result);
            }
            Some(Err(err)) => {
                let message = err.to_string();
                execution.final_result = Some(message.clone());
                execution.failure = Some(ExecutionFailure {
                    kind: failure_kind(&err),
                    message,
                });
            }
            None => {
                tracing::warn!(max_steps = self.max_steps, "step budget exhausted");
                execution.final_result = Some(BUDGET_EXCEEDED_MESSAGE.to_string());
                execution.failure = Some(ExecutionFailure {
                    kind: FailureKind::BudgetExceeded,
                    message: AgentError::BudgetExceeded(self.max_steps).to_string(),
                });
            }
        }

        self.write_patch(active).await;

        execution.execution_time = started.elapsed();
        if let Some(sink) = &self.trajectory {
            if let Err(e) = sink.finalize(&execution) {
                tracing::warn!(error = %e, "failed to write trajectory");
            }
        }
        tracing::info!(
            id = %execution.id,
            success = execution.success,
            steps = execution.steps.len(),
            total_tokens = execution.total_tokens.total_tokens,
            "task finished"
        );
        self.publish(AgentEvent::TaskFinished {
            success: execution.success,
            final_result: execution.final_result.clone(),
        });
        execution
    }

    /// 任务设置了 patch_path 时把工作区原始 diff 写入该文件；失败只记日志
    async fn write_patch(&self, active: &ActiveTask) {
        let Some(path) = &active.task.patch_path else {
            return;
        };
        let written = match active.evaluator.workspace_diff().await {
            Ok(diff) => tokio::fs::write(path, diff)
                .await
                .map_err(|e| AgentError::Workspace(e.to_string())),
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => tracing::info!(path = %path.display(), "patch written"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to write patch"),
        }
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// 当前任务（new_task 之后）
    pub fn task(&self) -> Option<&Task> {
        self.active.as_ref().map(|a| &a.task)
    }

    /// 当前任务的对话
    pub fn conversation(&self) -> Option<&Conversation> {
        self.active.as_ref().map(|a| &a.conversation)
    }

    /// 当前任务解析出的工具名（按解析顺序）
    pub fn tool_names(&self) -> Vec<String> {
        self.active
            .as_ref()
            .map(|a| a.executor.tools().names())
            .unwrap_or_default()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model_parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 会话级取消令牌：取消后当前与之后的任务都会以 Cancelled 结束
    pub fn cancel_token(&self) -> CancellationToken {
        self.supervisor.cancel_token()
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }
}

fn failure_kind(err: &AgentError) -> FailureKind {
    match err {
        AgentError::Cancelled => FailureKind::Cancelled,
        AgentError::Workspace(_) => FailureKind::Workspace,
        AgentError::BudgetExceeded(_) => FailureKind::BudgetExceeded,
        e if e.is_configuration_error() => FailureKind::Configuration,
        _ => FailureKind::Provider,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(failure_kind(&AgentError::Cancelled), FailureKind::Cancelled);
        assert_eq!(
            failure_kind(&AgentError::Workspace("not a repo".into())),
            FailureKind::Workspace
        );
        assert_eq!(
            failure_kind(&LlmError::Timeout("slow".into()).into()),
            FailureKind::Provider
        );
        assert_eq!(failure_kind(&AgentError::NoTask), FailureKind::Configuration);
    }
}

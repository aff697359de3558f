//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! CLI、交互模式与测试共用同一套装配：从 AppConfig 取 Provider 与模型参数，
//! 可覆盖 Provider / 模型 / 步数，也可注入自定义 LLM、工具注册表、diff 协作方与观察者。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::{Agent, AgentError};
use crate::llm::{create_llm_client, LlmClient, Provider};
use crate::observability::TrajectorySink;
use crate::react::{AgentEvent, ReflectionMode};
use crate::tools::ToolRegistry;
use crate::workspace::{GitDiff, WorkspaceDiff};

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    provider: Option<Provider>,
    model: Option<String>,
    max_steps: Option<usize>,
    reflection: Option<ReflectionMode>,
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    differ: Option<Arc<dyn WorkspaceDiff>>,
    trajectory: Option<Arc<dyn TrajectorySink>>,
    events: Option<UnboundedSender<AgentEvent>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            provider: None,
            model: None,
            max_steps: None,
            reflection: None,
            llm: None,
            registry: None,
            differ: None,
            trajectory: None,
            events: None,
        }
    }

    /// 覆盖配置中的 default_provider
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn reflection(mut self, mode: ReflectionMode) -> Self {
        self.reflection = Some(mode);
        self
    }

    /// 注入 LLM 客户端（测试用 MockLlmClient）；不设置时按 Provider 创建
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 替换工具注册表；默认为内置工具
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 替换 diff 协作方；默认为 GitDiff
    pub fn differ(mut self, differ: Arc<dyn WorkspaceDiff>) -> Self {
        self.differ = Some(differ);
        self
    }

    pub fn trajectory(mut self, sink: Arc<dyn TrajectorySink>) -> Self {
        self.trajectory = Some(sink);
        self
    }

    /// 订阅过程事件
    pub fn events(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        self.config.validate()?;
        let provider = match self.provider {
            Some(p) => p,
            None => self.config.provider()?,
        };
        let mut params = self.config.model_parameters(provider);
        if let Some(model) = self.model {
            params.model = model;
        }
        let max_steps = self.max_steps.unwrap_or(self.config.max_steps);
        if max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be at least 1".into()));
        }
        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_client(provider, &params)
                .map_err(|e| AgentError::ConfigError(e.to_string()))?,
        };
        tracing::debug!(provider = %provider, model = %params.model, max_steps, "agent built");

        Ok(Agent::from_parts(
            provider,
            params,
            llm,
            self.registry.unwrap_or_else(ToolRegistry::with_builtin),
            self.differ.unwrap_or_else(|| Arc::new(GitDiff::new())),
            self.trajectory,
            self.events,
            max_steps,
            self.reflection.unwrap_or(self.config.reflection),
            Duration::from_secs(self.config.tool_timeout_secs),
        ))
    }
}

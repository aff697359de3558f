//! 执行轨迹记录
//!
//! 任务期间在内存中累积 { metadata, task_info, agent_steps, llm_interactions, final_result }，
//! finalize 时写为格式化 JSON。写盘失败由调用方记 warn，不影响任务结果。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::{AgentStep, Execution};
use crate::llm::LlmResponse;
use crate::memory::Message;
use crate::tools::ToolSchema;

#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("failed to write trajectory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize trajectory: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 任务开始时记录的元数据
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task: String,
    pub provider: String,
    pub model: String,
    pub max_steps: usize,
    pub project_path: PathBuf,
    pub must_patch: bool,
    pub tools: Vec<String>,
}

/// 轨迹接收方：编排器与单步状态机通过它上报过程
pub trait TrajectorySink: Send + Sync {
    fn start_recording(&self, info: &TaskInfo);
    fn record_llm_request(&self, messages: &[Message], tools: &[ToolSchema]);
    fn record_llm_response(&self, response: &LlmResponse);
    fn record_step(&self, step: &AgentStep);
    fn finalize(&self, execution: &Execution) -> Result<(), TrajectoryError>;
}

#[derive(Debug, Clone, Serialize)]
struct TrajectoryData {
    metadata: Value,
    task_info: Value,
    agent_steps: Vec<Value>,
    llm_interactions: Vec<Value>,
    final_result: Value,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// 默认轨迹文件名：trajectory_<YYYYmmdd_HHMMSS>.json
pub fn default_trajectory_path() -> PathBuf {
    PathBuf::from(format!(
        "trajectory_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// 写 JSON 文件的轨迹记录器
#[derive(Debug)]
pub struct TrajectoryRecorder {
    path: PathBuf,
    data: Mutex<TrajectoryData>,
}

impl TrajectoryRecorder {
    /// path 为 None 时使用 default_trajectory_path()
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(default_trajectory_path),
            data: Mutex::new(TrajectoryData {
                metadata: json!({ "created_at": now(), "version": "1.0" }),
                task_info: Value::Null,
                agent_steps: Vec::new(),
                llm_interactions: Vec::new(),
                final_result: Value::Null,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前内存中的轨迹（JSON）
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&*self.lock()).unwrap_or(Value::Null)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrajectoryData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TrajectorySink for TrajectoryRecorder {
    fn start_recording(&self, info: &TaskInfo) {
        let mut data = self.lock();
        let mut task_info = serde_json::to_value(info).unwrap_or_else(|_| json!({}));
        task_info["started_at"] = json!(now());
        data.task_info = task_info;
        data.agent_steps.clear();
        data.llm_interactions.clear();
        data.final_result = Value::Null;
    }

    fn record_llm_request(&self, messages: &[Message], tools: &[ToolSchema]) {
        let mut data = self.lock();
        let provider = data.task_info["provider"].clone();
        let model = data.task_info["model"].clone();
        data.llm_interactions.push(json!({
            "type": "request",
            "timestamp": now(),
            "provider": provider,
            "model": model,
            "messages": messages,
            "tools": tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        }));
    }

    fn record_llm_response(&self, response: &LlmResponse) {
        self.lock().llm_interactions.push(json!({
            "type": "response",
            "timestamp": now(),
            "response": response,
        }));
    }

    fn record_step(&self, step: &AgentStep) {
        let mut value = serde_json::to_value(step).unwrap_or_else(|_| json!({}));
        value["timestamp"] = json!(now());
        self.lock().agent_steps.push(value);
    }

    fn finalize(&self, execution: &Execution) -> Result<(), TrajectoryError> {
        let body = {
            let mut data = self.lock();
            data.final_result = json!({
                "success": execution.success,
                "result": execution.final_result,
                "failure": execution.failure,
                "total_tokens": execution.total_tokens,
                "execution_time_secs": execution.execution_time.as_secs_f64(),
                "completed_at": now(),
            });
            serde_json::to_string_pretty(&*data)?
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TrajectoryError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, body).map_err(|source| TrajectoryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

//! 任务过程事件：编排器推送给观察者（如 CLI 控制台），引擎本身不依赖任何输出设备

use serde::Serialize;

use crate::core::AgentStep;

/// 过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 任务开始
    TaskStarted { task: String, max_steps: usize },
    /// 某一步开始（正在调用模型）
    StepStarted { step_number: usize, max_steps: usize },
    /// 某一步已定稿
    StepRecorded { step: Box<AgentStep> },
    /// 任务结束
    TaskFinished {
        success: bool,
        final_result: Option<String>,
    },
}

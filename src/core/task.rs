//! 任务定义：创建后不可变

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// new_task 的附加参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    /// 工作区根目录（必需）
    pub project_path: Option<PathBuf>,
    /// 问题描述（必需）
    pub issue: Option<String>,
    /// 计算补丁时的基线提交
    pub base_commit: Option<String>,
    /// 是否要求非空补丁才算完成
    #[serde(default)]
    pub must_patch: bool,
    /// 结束后把工作区 diff 写入该文件
    pub patch_path: Option<PathBuf>,
    /// 显式工具列表；为空时使用默认工具集
    pub tool_names: Option<Vec<String>>,
}

impl TaskOptions {
    pub fn new(project_path: impl Into<PathBuf>, issue: impl Into<String>) -> Self {
        Self {
            project_path: Some(project_path.into()),
            issue: Some(issue.into()),
            ..Default::default()
        }
    }

    pub fn must_patch(mut self, must_patch: bool) -> Self {
        self.must_patch = must_patch;
        self
    }

    pub fn base_commit(mut self, base_commit: impl Into<String>) -> Self {
        self.base_commit = Some(base_commit.into());
        self
    }

    pub fn patch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.patch_path = Some(path.into());
        self
    }

    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// 已校验的任务
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub description: String,
    pub project_path: PathBuf,
    pub issue: String,
    pub base_commit: Option<String>,
    pub must_patch: bool,
    pub patch_path: Option<PathBuf>,
    pub tool_names: Option<Vec<String>>,
}

impl Task {
    /// 校验描述、工作区根目录与问题描述；空白字符串视为缺失
    pub fn new(description: impl Into<String>, options: TaskOptions) -> Result<Self, AgentError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(AgentError::InvalidTask("task description must not be empty".into()));
        }
        let project_path = options
            .project_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(AgentError::MissingParameter("project_path"))?;
        let issue = options
            .issue
            .filter(|i| !i.trim().is_empty())
            .ok_or(AgentError::MissingParameter("issue"))?;
        Ok(Self {
            description,
            project_path,
            issue,
            base_commit: options.base_commit.filter(|b| !b.trim().is_empty()),
            must_patch: options.must_patch,
            patch_path: options.patch_path,
            tool_names: options.tool_names,
        })
    }
}

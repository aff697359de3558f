//! 任务完成判定与测试补丁过滤
//!
//! must_patch 关闭时，模型声明完成即接受；开启时要求工作区 diff 去掉测试文件改动后仍非空。

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::AgentError;
use crate::workspace::WorkspaceDiff;

/// must_patch 下补丁为空时回给模型的提示
pub const TASK_INCOMPLETE_MESSAGE: &str =
    "ERROR! Your Patch is empty. Please provide a patch that fixes the problem.";

/// 判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionVerdict {
    Accepted,
    /// 拒绝及原因（会作为用户消息回给模型）
    Rejected(String),
}

impl CompletionVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CompletionVerdict::Accepted)
    }
}

/// 完成判定器
pub struct CompletionEvaluator {
    must_patch: bool,
    workspace_root: PathBuf,
    base_commit: Option<String>,
    differ: Arc<dyn WorkspaceDiff>,
}

impl CompletionEvaluator {
    pub fn new(
        must_patch: bool,
        workspace_root: impl Into<PathBuf>,
        base_commit: Option<String>,
        differ: Arc<dyn WorkspaceDiff>,
    ) -> Self {
        Self {
            must_patch,
            workspace_root: workspace_root.into(),
            base_commit,
            differ,
        }
    }

    pub fn must_patch(&self) -> bool {
        self.must_patch
    }

    /// 工作区原始 diff（未过滤）
    pub async fn workspace_diff(&self) -> Result<String, AgentError> {
        self.differ
            .diff(&self.workspace_root, self.base_commit.as_deref())
            .await
    }

    /// 模型声明完成后调用
    pub async fn evaluate(&self) -> Result<CompletionVerdict, AgentError> {
        if !self.must_patch {
            return Ok(CompletionVerdict::Accepted);
        }
        let diff = self.workspace_diff().await?;
        let filtered = remove_patches_to_tests(&diff);
        if filtered.trim().is_empty() {
            tracing::info!("completion rejected: patch is empty after removing test changes");
            Ok(CompletionVerdict::Rejected(TASK_INCOMPLETE_MESSAGE.to_string()))
        } else {
            Ok(CompletionVerdict::Accepted)
        }
    }

    pub async fn is_task_completed(&self) -> Result<bool, AgentError> {
        Ok(self.evaluate().await?.is_accepted())
    }
}

fn test_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/(test|tests|testing)/|test_|tox\.ini").expect("static test-path regex is valid")
    })
}

/// 从统一 diff 中删除目标路径属于测试文件的段
///
/// 以 `diff --git a/<path> b/<path>` 为段首；b/ 路径匹配测试模式的整段丢弃，其余按原样保留。
/// 第一个段首之前的内容保留。结果再过滤一次不变。
pub fn remove_patches_to_tests(diff: &str) -> String {
    let pattern = test_path_pattern();
    let mut kept = String::with_capacity(diff.len());
    let mut in_test_segment = false;
    for line in diff.split_inclusive('\n') {
        if line.starts_with("diff --git a/") {
            let target = line.split_whitespace().last().unwrap_or_default();
            in_test_segment = target.starts_with("b/") && pattern.is_match(target);
        }
        if !in_test_segment {
            kept.push_str(line);
        }
    }
    kept
}

//! 工作区 diff 协作方
//!
//! CompletionEvaluator 与补丁输出通过 WorkspaceDiff 取得工作区相对基线的统一 diff。
//! GitDiff 把工作区路径交给子进程作为工作目录，从不修改本进程的当前目录。

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::AgentError;

/// 计算工作区 diff
#[async_trait]
pub trait WorkspaceDiff: Send + Sync {
    /// base_commit 为 None 时相对暂存区/HEAD（`git diff`），否则比较工作树与该提交
    async fn diff(&self, root: &Path, base_commit: Option<&str>) -> Result<String, AgentError>;
}

/// 基于 git 命令行的实现
#[derive(Debug, Default, Clone, Copy)]
pub struct GitDiff;

impl GitDiff {
    pub fn new() -> Self {
        Self
    }

    async fn run_git(root: &Path, args: &[&str]) -> Result<std::process::Output, AgentError> {
        Command::new("git")
            .args(args)
            .current_dir(root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AgentError::Workspace(format!("failed to run git: {e}")))
    }
}

#[async_trait]
impl WorkspaceDiff for GitDiff {
    async fn diff(&self, root: &Path, base_commit: Option<&str>) -> Result<String, AgentError> {
        if !root.is_dir() {
            return Err(AgentError::Workspace(format!(
                "project path does not exist or is not a directory: {}",
                root.display()
            )));
        }

        let probe = Self::run_git(root, &["rev-parse", "--is-inside-work-tree"]).await?;
        if !probe.status.success() {
            return Err(AgentError::Workspace(format!(
                "not a git repository: {}",
                root.display()
            )));
        }

        let mut args = vec!["--no-pager", "diff"];
        if let Some(base) = base_commit.filter(|b| !b.trim().is_empty()) {
            args.push(base);
        }
        let output = Self::run_git(root, &args).await?;
        if !output.status.success() {
            return Err(AgentError::Workspace(format!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = GitDiff.diff(&missing, None).await.unwrap_err();
        assert!(matches!(err, AgentError::Workspace(_)));
        assert!(err.is_configuration_error());
    }
}

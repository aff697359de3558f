//! 真实 git 仓库上的 diff 与端到端补丁校验（未安装 git 时跳过）

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use serde_json::json;

use codebee::config::AppConfig;
use codebee::core::{AgentBuilder, AgentError, AgentState, TaskOptions};
use codebee::llm::{LlmResponse, MockLlmClient, ToolCall};
use codebee::react::{remove_patches_to_tests, CompletionEvaluator};
use codebee::workspace::{GitDiff, WorkspaceDiff};

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=codebee", "-c", "user.email=codebee@example.com"])
        .args(args)
        .current_dir(root)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed: {:?}", args, output);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// 建一个只有一次提交的仓库：app.py 与 tests/test_app.py
fn init_repo(root: &Path) -> String {
    git(root, &["init", "-q"]);
    std::fs::write(root.join("app.py"), "x = 1\n").unwrap();
    std::fs::create_dir_all(root.join("tests")).unwrap();
    std::fs::write(root.join("tests/test_app.py"), "assert True\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "init"]);
    git(root, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn test_non_repo_is_workspace_error() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let err = GitDiff::new().diff(dir.path(), None).await.unwrap_err();
    assert!(matches!(err, AgentError::Workspace(_)));
}

#[tokio::test]
async fn test_diff_tracks_working_tree() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let head = init_repo(dir.path());
    let differ = GitDiff::new();

    assert_eq!(differ.diff(dir.path(), None).await.unwrap(), "");

    std::fs::write(dir.path().join("tests/test_app.py"), "assert 1 == 1\n").unwrap();
    let diff = differ.diff(dir.path(), Some(&head)).await.unwrap();
    assert!(diff.contains("diff --git a/tests/test_app.py b/tests/test_app.py"));
    assert_eq!(remove_patches_to_tests(&diff), "");

    std::fs::write(dir.path().join("app.py"), "x = 2\n").unwrap();
    let diff = differ.diff(dir.path(), Some(&head)).await.unwrap();
    let filtered = remove_patches_to_tests(&diff);
    assert!(filtered.contains("+x = 2"));
    assert!(!filtered.contains("test_app.py"));

    let evaluator = CompletionEvaluator::new(true, dir.path(), Some(head), Arc::new(differ));
    assert!(evaluator.is_task_completed().await.unwrap());
}

#[tokio::test]
async fn test_agent_patches_repo_with_bash() {
    if !git_available() || cfg!(windows) {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let out = tempfile::tempdir().unwrap();
    let patch_path = out.path().join("fix.patch");

    let llm = Arc::new(MockLlmClient::with_responses([
        LlmResponse::with_tool_calls("", vec![ToolCall::new("t1", "task_done", json!({}))]),
        LlmResponse::with_tool_calls(
            "",
            vec![ToolCall::new(
                "b1",
                "bash",
                json!({ "command": "printf 'x = 2\\n' > app.py" }),
            )],
        ),
        LlmResponse::with_tool_calls("Changed x to 2", vec![ToolCall::new("t2", "task_done", json!({}))]),
    ]));
    let mut agent = AgentBuilder::new(AppConfig::default())
        .llm(llm)
        .max_steps(5)
        .build()
        .unwrap();
    agent
        .new_task(
            "x should be 2",
            TaskOptions::new(dir.path(), "x should be 2")
                .must_patch(true)
                .patch_path(&patch_path),
        )
        .unwrap();

    let exec = agent.execute_task().await;
    assert!(exec.success, "{:?}", exec.failure);
    assert_eq!(exec.steps.len(), 3);
    // 第一次 task_done 时补丁为空，被拒绝
    assert_eq!(exec.steps[0].state, AgentState::Reflecting);
    assert!(exec.steps[1].tool_results[0].success);
    assert_eq!(exec.final_result.as_deref(), Some("Changed x to 2"));

    let patch = std::fs::read_to_string(&patch_path).unwrap();
    assert!(patch.contains("+x = 2"));
    assert_eq!(std::fs::read_to_string(dir.path().join("app.py")).unwrap(), "x = 2\n");
}

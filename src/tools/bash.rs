//! bash 工具：在工作区根目录下用全新的 sh -c / cmd /C 执行命令
//!
//! 每次调用一个独立 shell，状态不保留；output 为 stdout，error 为 stderr，status 为退出码。
//! 只拦截破坏宿主机的命令子串（格式化磁盘、写块设备、fork 炸弹、删除根目录）。

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::process::Command;

use crate::llm::ToolArguments;
use crate::tools::schema::{parameters_of, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolExecResult, ToolParameter};

/// 禁止的命令子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "mkfs",
    "> /dev/sd",
    "of=/dev/sd",
    ":(){ :|:& };:", // fork bomb
    "rm -rf / ",
    "rm -rf /*",
];

const DESCRIPTION: &str = "Run commands in a bash shell
* Each command is run in a new, separate shell. State is NOT persistent across commands.
* The working directory is the project root.
* When invoking this tool, the contents of the \"command\" parameter does NOT need to be XML-escaped.
* To inspect a particular line range of a file, e.g. lines 10-25, try 'sed -n 10,25p /path/to/the/file'.
* Please avoid commands that may produce a very large amount of output.
";

#[derive(Debug, Deserialize, JsonSchema)]
struct BashArgs {
    /// The bash command to run.
    command: String,
}

/// bash 工具
pub struct BashTool {
    workdir: PathBuf,
    timeout: Duration,
}

impl BashTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            workdir: ctx.workspace_root.clone(),
            timeout: ctx.timeout,
        }
    }
}

fn check_forbidden(command: &str) -> Result<(), String> {
    let lower = command.to_lowercase();
    if lower.trim() == "rm -rf /" {
        return Err("Forbidden pattern: rm -rf /".to_string());
    }
    match FORBIDDEN_SUBSTR.iter().find(|p| lower.contains(*p)) {
        Some(p) => Err(format!("Forbidden pattern: {p}")),
        None => Ok(()),
    }
}

fn non_empty(bytes: &[u8]) -> Option<String> {
    let s = String::from_utf8_lossy(bytes).trim().to_string();
    (!s.is_empty()).then_some(s)
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        parameters_of::<BashArgs>()
    }

    async fn execute(&self, args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        let command = match parse_args::<BashArgs>(args) {
            Ok(a) if !a.command.trim().is_empty() => a.command,
            _ => {
                return Ok(ToolExecResult::failed(
                    format!("No command provided for the {} tool", self.name()),
                    -1,
                ))
            }
        };
        if let Err(msg) = check_forbidden(&command) {
            return Ok(ToolExecResult::failed(msg, -1));
        }

        tracing::debug!(command = %command, cwd = %self.workdir.display(), "bash tool execute");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", &command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command]);
            c
        };
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(out) => out.map_err(|e| ToolError::Execution(format!("Error running bash command: {e}")))?,
            Err(_) => {
                return Ok(ToolExecResult::failed(
                    format!("Command timed out after {}s", self.timeout.as_secs()),
                    -1,
                ))
            }
        };

        Ok(ToolExecResult {
            output: non_empty(&output.stdout),
            error: non_empty(&output.stderr),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(root: &std::path::Path) -> BashTool {
        BashTool::new(&ToolContext::new(root, Duration::from_secs(10)))
    }

    fn args(v: serde_json::Value) -> ToolArguments {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_forbidden() {
        assert!(check_forbidden("mkfs.ext4 /dev/sda1").is_err());
        assert!(check_forbidden("rm -rf /").is_err());
        assert!(check_forbidden("rm -rf build/").is_ok());
        assert!(check_forbidden("ls -la").is_ok());
    }

    #[tokio::test]
    async fn test_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let res = tool(dir.path()).execute(&ToolArguments::new()).await.unwrap();
        assert_eq!(res.status, -1);
        assert_eq!(res.error.as_deref(), Some("No command provided for the bash tool"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "hi").unwrap();
        let res = tool(dir.path())
            .execute(&args(json!({"command": "ls; echo oops >&2; exit 3"})))
            .await
            .unwrap();
        assert_eq!(res.output.as_deref(), Some("marker.txt"));
        assert_eq!(res.error.as_deref(), Some("oops"));
        assert_eq!(res.status, 3);
    }

    #[test]
    fn test_schema_requires_command() {
        let dir = tempfile::tempdir().unwrap();
        let params = tool(dir.path()).parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "command");
        assert!(params[0].required);
    }
}

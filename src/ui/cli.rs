//! 命令行参数定义（clap derive）

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::core::{AgentBuilder, AgentError, TaskOptions};
use crate::llm::Provider;
use crate::observability::TrajectoryRecorder;

#[derive(Parser, Debug)]
#[command(name = "codebee", version)]
#[command(about = "Autonomous coding agent: drives an LLM through a bounded tool-calling loop on your repository")]
#[command(long_about = r#"
codebee runs an LLM agent against a local repository. Each step the model either
answers, or calls tools (bash, file editing, sequential thinking, task_done);
the loop ends when the task is accepted, the step budget runs out, or Ctrl-C.

Configuration is read from (later sources override earlier ones):
  1. codebee_config.json / codebee.toml / config/default.toml (first found)
  2. --config-file <path>
  3. CODEBEE__* environment variables

Example:
  codebee run "Fix the failing date parser test" --working-dir ./repo --must-patch
  codebee interactive --provider ollama --model llama3
  codebee show-config
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single task and exit
    Run(RunArgs),
    /// Start an interactive session; each line runs as a task
    Interactive(SessionArgs),
    /// Print the resolved provider settings (API keys masked)
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Task description; also used as the problem statement
    pub task: String,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// run 与 interactive 共用的参数
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Where to write the trajectory JSON (default: trajectory_<timestamp>.json)
    #[arg(long, value_name = "PATH")]
    pub trajectory_file: Option<PathBuf>,

    /// Repository the agent works on (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// LLM provider (openai, anthropic, azure, openrouter, doubao, ollama)
    #[arg(short, long)]
    pub provider: Option<Provider>,

    /// Model name, overriding the provider default
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum number of steps
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Only accept completion when the diff, minus test files, is non-empty
    #[arg(long)]
    pub must_patch: bool,

    /// Write the final workspace diff to this file
    #[arg(long, value_name = "PATH")]
    pub patch_path: Option<PathBuf>,

    /// Commit to diff against
    #[arg(long, value_name = "COMMIT")]
    pub base_commit: Option<String>,

    /// Comma-separated tool names (default: bash,str_replace_based_edit_tool,sequentialthinking,task_done)
    #[arg(long, value_delimiter = ',')]
    pub tools: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowConfigArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Show this provider instead of the configured default
    #[arg(short, long)]
    pub provider: Option<Provider>,
}

impl SessionArgs {
    /// 工作区根目录：--working-dir 或当前目录，转为绝对路径
    pub fn workspace_root(&self) -> Result<PathBuf, AgentError> {
        let dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| AgentError::Workspace(format!("cannot read current directory: {e}")))?,
        };
        dir.canonicalize()
            .map_err(|e| AgentError::Workspace(format!("{}: {e}", dir.display())))
    }

    /// 任务参数：问题描述即任务文本
    pub fn task_options(&self, root: PathBuf, task: &str) -> TaskOptions {
        let mut options = TaskOptions::new(root, task).must_patch(self.must_patch);
        if let Some(commit) = &self.base_commit {
            options = options.base_commit(commit.clone());
        }
        if let Some(path) = &self.patch_path {
            options = options.patch_path(path.clone());
        }
        if let Some(tools) = &self.tools {
            options = options.tools(tools.iter().map(|t| t.trim()).filter(|t| !t.is_empty()));
        }
        options
    }

    /// 按命令行覆盖装配 AgentBuilder（含轨迹记录器）
    pub fn agent_builder(&self, config: &AppConfig) -> AgentBuilder {
        let mut builder = AgentBuilder::new(config.clone()).trajectory(Arc::new(
            TrajectoryRecorder::new(self.trajectory_file.clone()),
        ));
        if let Some(provider) = self.provider {
            builder = builder.provider(provider);
        }
        if let Some(model) = &self.model {
            builder = builder.model(model.clone());
        }
        if let Some(max_steps) = self.max_steps {
            builder = builder.max_steps(max_steps);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "codebee",
            "run",
            "fix the bug",
            "--provider",
            "OpenAI",
            "--max-steps",
            "7",
            "--must-patch",
            "--tools",
            "bash,task_done",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.task, "fix the bug");
        assert_eq!(args.session.provider, Some(Provider::OpenAi));
        assert_eq!(args.session.max_steps, Some(7));
        assert!(args.session.must_patch);
        assert_eq!(
            args.session.tools.as_deref(),
            Some(&["bash".to_string(), "task_done".to_string()][..])
        );
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["codebee", "run", "x", "--provider", "gemini"]).is_err());
    }

    #[test]
    fn test_task_options_from_flags() {
        let args = SessionArgs {
            must_patch: true,
            base_commit: Some("abc123".into()),
            tools: Some(vec!["bash".into(), " ".into()]),
            ..Default::default()
        };
        let options = args.task_options(PathBuf::from("/repo"), "fix it");
        assert_eq!(options.issue.as_deref(), Some("fix it"));
        assert!(options.must_patch);
        assert_eq!(options.base_commit.as_deref(), Some("abc123"));
        assert_eq!(options.tool_names, Some(vec!["bash".to_string()]));
    }

    #[test]
    fn test_workspace_root_must_exist() {
        let args = SessionArgs {
            working_dir: Some(PathBuf::from("/definitely/not/here")),
            ..Default::default()
        };
        assert!(matches!(args.workspace_root(), Err(AgentError::Workspace(_))));
    }
}

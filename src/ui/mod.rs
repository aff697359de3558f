//! CLI 层：参数（cli）、控制台输出（console）、交互模式（interactive）

pub mod cli;
pub mod console;
pub mod interactive;

pub use cli::{Cli, Commands, RunArgs, SessionArgs, ShowConfigArgs};
pub use console::{format_execution, format_step, print_config, run_task, spawn_reporter};
pub use interactive::{parse_command, run_interactive, ReplCommand};

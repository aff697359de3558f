//! 可观测性：tracing 日志初始化与执行轨迹记录

pub mod trajectory;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use trajectory::{default_trajectory_path, TaskInfo, TrajectoryError, TrajectoryRecorder, TrajectorySink};

/// 由 -v 次数推导默认日志级别
pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// 安装全局 subscriber：RUST_LOG 优先，否则按 verbosity；日志写 stderr，stdout 留给控制台输出
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codebee={}", default_level(verbosity))));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

//! 日志初始化
//!
//! `RUST_LOG` 存在时优先使用，否则按配置的级别过滤。重复初始化是无害的。

use crate::config::{LogLevel, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// 安装全局 tracing 订阅者
///
/// 返回 `false` 表示已有订阅者（例如测试进程中多次调用）。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(target: "bridge", level = ?config.level, "Script bridge logging initialized");
    }
    installed
}

impl LogLevel {
    /// 对应的 `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

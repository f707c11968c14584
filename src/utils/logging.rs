use std::str::FromStr;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self},
    layer::SubscriberExt,
};

use crate::consts::LOG_LEVEL;

/// 初始化 Logger
///
/// 日志始终输出到控制台；`log_folder` 不为空时同时写入该目录，
/// 文件按天分割，前缀为 `precache_log`。
///
/// 返回的 guard 需要一直持有，drop 之后文件日志不再刷新。
pub fn init_logger(log_level: &str, log_folder: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let env_layer = EnvFilter::from_str(log_level).unwrap_or_else(|_| LOG_LEVEL.into());

    let formatting_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);

    let (file_subscriber, guard) = if log_folder.is_empty() {
        (None, None)
    } else {
        let file_appender = tracing_appender::rolling::daily(log_folder, "precache_log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(non_blocking);
        (Some(layer), Some(guard))
    };

    let collector = tracing_subscriber::registry()
        .with(env_layer)
        .with(formatting_layer)
        .with(file_subscriber);
    tracing::subscriber::set_global_default(collector)
        .with_context(|| "to set a global collector")?;
    Ok(guard)
}

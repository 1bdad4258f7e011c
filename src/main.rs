use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mcs_bus::{handler_fn, init_logging, logging::LogFormat, Broker, Settings};
use tracing::{error, info};

/// Аргументы командной строки `mcs-bus`.
///
/// Параметры логов читаются из флагов или `MCS_LOG_*`, флаг важнее.
/// Остальное берётся из `MCS_*` (см. `Settings::load`).
#[derive(Parser, Debug)]
#[command(name = "mcs-bus")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ")"))]
#[command(about = "In-process message broker for machine control services", long_about = None)]
struct Args {
    /// Уровень логирования
    #[arg(short, long, env = "MCS_LOG_LEVEL", help = "Уровень логирования (trace..error)")]
    log_level: Option<String>,
    /// Формат логов
    #[arg(long, env = "MCS_LOG_FORMAT", help = "Формат логов: pretty, compact, json")]
    log_format: Option<LogFormat>,
    /// Каталог для файла логов; включает файловый sink
    #[arg(long, env = "MCS_LOG_DIR", help = "Каталог файловых логов")]
    log_dir: Option<PathBuf>,
    /// Допустимые топики
    #[arg(
        long,
        value_delimiter = ',',
        help = "Список допустимых топиков через запятую (по умолчанию любые)"
    )]
    valid_topics: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load().context("failed to load configuration")?;

    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    if let Some(format) = args.log_format {
        settings.logging.format = format;
    }
    if let Some(dir) = args.log_dir {
        settings.logging.log_dir = dir;
        settings.logging.file.enabled = true;
    }
    if !args.valid_topics.is_empty() {
        settings.broker.valid_topics = args.valid_topics;
    }

    let logging = init_logging(settings.logging.clone()).map_err(|e| anyhow::anyhow!(e))?;
    info!(
        build_time = env!("BUILD_TIME"),
        commit = env!("GIT_COMMIT"),
        "Starting mcs-bus"
    );

    let broker = Broker::new(settings.broker.clone());
    let error_topic = broker.config().error_topic.clone();
    broker.subscribe(
        &error_topic,
        handler_fn(|env| async move {
            let field = |name: &str| env.get(name).cloned().unwrap_or_default();
            error!(
                topic = %field("topic"),
                error = %field("error"),
                request_id = %field("request_id"),
                "Handler failure reported"
            );
            Ok(())
        }),
    )?;
    broker.start()?;
    info!(
        error_topic = %error_topic,
        request_timeout = ?broker.config().request_timeout(),
        "Broker is running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!(stats = ?broker.stats(), "Shutdown requested");
    broker.shutdown().await?;
    info!(stats = ?broker.stats(), "Broker stopped");

    logging.shutdown_async().await;
    Ok(())
}

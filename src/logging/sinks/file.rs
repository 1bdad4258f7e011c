use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// File layer: ежедневная ротация, неблокирующая запись.
///
/// Возвращённый `WorkerGuard` нужно держать, пока нужен лог: при drop он
/// сбрасывает буфер.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> std::io::Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = daily(&config.log_dir, &config.file.filename);
    let (writer, guard) = non_blocking(file_appender);

    let layer = formatter::build_formatter(&config.console, config.file_format(), false, writer);
    Ok((layer, guard))
}

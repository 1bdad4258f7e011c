use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{ConsoleConfig, LogFormat};

/// Собирает fmt-layer для заданного формата и writer.
///
/// Возвращаем boxed trait-объект, чтобы стереть конкретный тип формата
/// (json/pretty/compact).
pub fn build_formatter<S, W>(
    console: &ConsoleConfig,
    format: LogFormat,
    with_ansi: bool,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(console.with_target)
                .with_thread_ids(console.with_thread_ids)
                .with_line_number(console.with_line_numbers),
        ),
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(console.with_target)
                .with_thread_ids(console.with_thread_ids)
                .with_line_number(console.with_line_numbers),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(console.with_target)
                .with_thread_ids(console.with_thread_ids)
                .with_line_number(console.with_line_numbers),
        ),
    }
}

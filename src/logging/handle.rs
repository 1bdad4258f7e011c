use std::time::{Duration, Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового sink: пока handle жив, фоновый writer сбрасывает
/// записи на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    /// Timeout для flush при shutdown (по умолчанию 5 секунд)
    flush_timeout: Duration,
    shut_down: bool,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_timeout: Duration::from_secs(5),
            shut_down: false,
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Graceful shutdown: сбрасывает буфер файлового sink.
    pub fn shutdown(mut self) {
        self.shut_down = true;
        let start = Instant::now();

        drop(self.file_guard.take());

        let elapsed = start.elapsed();
        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Shutdown для async контекстов: flush выполняется в блокирующем потоке.
    pub async fn shutdown_async(mut self) {
        self.shut_down = true;
        let guard = self.file_guard.take();

        match tokio::time::timeout(
            self.flush_timeout,
            tokio::task::spawn_blocking(move || drop(guard)),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                self.flush_timeout.as_millis()
            ),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if !self.shut_down && self.file_guard.is_some() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            )
        }
    }
}

use std::{any::Any, sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, trace, warn};

use super::{broker::Shared, Envelope, Handler, Payload};
use crate::{BrokerError, ErrorExt, StatusCode};

/// Значение поля `source` в отчётах об ошибках.
pub const ERROR_SOURCE: &str = "message_broker";

/// Причина, по которой обработчик не смог обработать сообщение.
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("{0:#}")]
    Failed(anyhow::Error),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
    /// Задача обработчика отменена runtime'ом (runtime завершается).
    #[error("handler task was cancelled")]
    Cancelled,
}

impl DeliveryFailure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Failed(_) => StatusCode::HandlerFailed,
            Self::Panicked(_) => StatusCode::HandlerPanicked,
            Self::TimedOut(_) => StatusCode::HandlerTimeout,
            Self::Cancelled => StatusCode::RuntimeUnavailable,
        }
    }

    /// Сбой инфраструктуры доставки, а не самого обработчика.
    fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Цикл доставки.
///
/// Забирает сообщения из очереди по одному и вызывает получателей
/// последовательно. Завершается по отмене `shared.shutdown` и возвращает
/// приёмник, чтобы `shutdown()` мог подсчитать недоставленные сообщения.
pub(crate) async fn run(
    shared: Arc<Shared>,
    mut rx: UnboundedReceiver<Envelope>,
) -> UnboundedReceiver<Envelope> {
    debug!("Dispatch loop started");
    loop {
        let next = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            next = rx.recv() => next,
        };

        let Some(envelope) = next else {
            // все отправители закрыты: очередь больше не наполнится
            error!("Message queue closed, dispatch loop exits");
            break;
        };
        shared.metrics.dequeued();

        if let Err(failure) = deliver(&shared, envelope).await {
            let backoff = shared.config.retry_backoff();
            error!(error = %failure, ?backoff, "Dispatch failure, backing off");
            tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
    debug!("Dispatch loop stopped");
    rx
}

/// Доставляет сообщение всем текущим получателям.
///
/// Сбой отдельного обработчика не прерывает доставку остальным.
/// Возвращает ошибку только при сбое инфраструктуры.
async fn deliver(
    shared: &Shared,
    envelope: Envelope,
) -> Result<(), DeliveryFailure> {
    let recipients = shared.registry.recipients(&envelope.topic);
    if recipients.is_empty() {
        trace!(topic = %envelope.topic, "No subscribers");
        return Ok(());
    }

    let mut infrastructure = None;
    for handler in recipients {
        match invoke(&handler, envelope.clone(), shared.config.handler_timeout()).await {
            Ok(()) => shared.metrics.record_delivered(),
            Err(failure) if failure.is_infrastructure() => infrastructure = Some(failure),
            Err(failure) => report_failure(shared, &envelope, &handler, failure),
        }
    }
    infrastructure.map_or(Ok(()), Err)
}

/// Вызывает обработчик в отдельной задаче. Паника обработчика
/// перехватывается runtime'ом и возвращается как [`DeliveryFailure`].
///
/// Задача обработчика живёт не дольше этого future: по таймауту или при
/// прерывании цикла доставки она прерывается.
async fn invoke(
    handler: &Handler,
    envelope: Envelope,
    timeout: Option<Duration>,
) -> Result<(), DeliveryFailure> {
    let h = handler.clone();
    let mut task = AbortOnDropHandle::new(tokio::spawn(async move { h.call(envelope).await }));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => return Err(DeliveryFailure::TimedOut(limit)),
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeliveryFailure::Failed(e)),
        Err(e) if e.is_panic() => Err(DeliveryFailure::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(DeliveryFailure::Cancelled),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Логирует сбой обработчика и публикует отчёт в топик ошибок.
///
/// Сбой обработчика самого топика ошибок только логируется.
fn report_failure(
    shared: &Shared,
    envelope: &Envelope,
    handler: &Handler,
    failure: DeliveryFailure,
) {
    shared.metrics.record_failure();
    error!(
        topic = %envelope.topic,
        handler = %handler.id(),
        status = %failure.status_code(),
        error = %failure,
        "Error in message handler"
    );

    if *envelope.topic == *shared.config.error_topic {
        warn!(handler = %handler.id(), "Error topic handler failed, report not re-published");
        return;
    }

    let report = error_report(
        &envelope.topic,
        &failure.to_string(),
        failure.status_code(),
        &envelope.payload,
    );
    if let Err(e) = shared.enqueue(Envelope::new(shared.config.error_topic.as_str(), report)) {
        error!(error = %e, "Failed to publish error report");
    }
}

/// Собирает payload отчёта об ошибке.
///
/// Если исходный payload содержит `request_id`, он копируется на верхний
/// уровень отчёта.
pub fn error_report(
    topic: &str,
    error: &str,
    status: StatusCode,
    payload: &Payload,
) -> Payload {
    let mut report = Payload::new();
    report.insert("source".into(), json!(ERROR_SOURCE));
    report.insert("topic".into(), json!(topic));
    report.insert("error".into(), json!(error));
    report.insert("status".into(), json!(status.as_str()));
    report.insert("payload".into(), Value::Object(payload.clone()));
    report.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    if let Some(request_id) = payload.get("request_id") {
        report.insert("request_id".into(), request_id.clone());
    }
    report
}

/// Отчёт для отклонённой публикации.
pub(crate) fn rejection_report(
    err: &BrokerError,
    topic: &str,
    payload: &Payload,
) -> Payload {
    error_report(topic, &err.to_string(), err.status_code(), payload)
}

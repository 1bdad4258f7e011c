use std::{any::Any, time::Duration};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки публичного API брокера.
///
/// Ошибки обработчиков сюда не попадают: они изолируются внутри цикла
/// доставки и превращаются в сообщения топика `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Топик или шаблон отклонён политикой топиков
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Брокер уже остановлен через `shutdown()`
    #[error("message broker has been shut down")]
    ShutDown,

    /// Нет async-рантайма для запуска цикла доставки
    #[error("failed to start dispatch loop: {0}")]
    RuntimeUnavailable(String),

    /// Очередь сообщений закрыта
    #[error("failed to enqueue message for topic '{topic}': queue is closed")]
    QueueClosed { topic: String },

    /// Ответ на запрос не пришёл вовремя
    #[error("request to '{topic}' timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    /// Ошибка при остановке брокера
    #[error("failed to shut down message broker: {0}")]
    Teardown(String),
}

impl BrokerError {
    pub fn invalid_topic(
        topic: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Отличает «ответа не было» от прочих ошибок брокера.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl ErrorExt for BrokerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTopic { .. } => StatusCode::InvalidTopic,
            Self::ShutDown => StatusCode::AlreadyShutDown,
            Self::RuntimeUnavailable(_) => StatusCode::RuntimeUnavailable,
            Self::QueueClosed { .. } => StatusCode::QueueClosed,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Teardown(_) => StatusCode::TeardownFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidTopic { topic, .. } => format!("Invalid topic: {topic}"),
            Self::ShutDown => "Broker is shut down".to_string(),
            Self::RuntimeUnavailable(_) | Self::Teardown(_) => "Internal broker error".to_string(),
            Self::QueueClosed { .. } => "Message queue closed".to_string(),
            Self::Timeout { topic, .. } => format!("No reply from {topic}"),
        }
    }
}

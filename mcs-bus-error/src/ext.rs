use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок брокера (object-safe).
///
/// Предоставляет вспомогательные методы для работы с ошибками:
/// - извлечение статус-кода,
/// - безопасное сообщение для потребителей топика `error`,
/// - детализированное сообщение для логов.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any) для downcast.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение без внутренних деталей реализации.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Internal => "Internal broker error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }
}

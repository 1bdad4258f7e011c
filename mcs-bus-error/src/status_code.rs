use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок брокера.
///
/// # Диапазоны:
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки топиков и подписок
/// - 3xxx: Жизненный цикл брокера
/// - 4xxx: Ошибки обработчиков
/// - 5xxx: Очередь / доставка / ожидание ответа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 1xxx: Общие ошибки ===
    Internal = 1001,

    // === 2xxx: Топики ===
    InvalidTopic = 2000,

    // === 3xxx: Жизненный цикл ===
    AlreadyShutDown = 3001,
    RuntimeUnavailable = 3002,
    TeardownFailed = 3003,

    // === 4xxx: Обработчики ===
    HandlerFailed = 4000,
    HandlerPanicked = 4001,
    HandlerTimeout = 4002,

    // === 5xxx: Очередь и ответы ===
    QueueClosed = 5000,
    Timeout = 5001,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Имеет ли смысл повторить операцию.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::HandlerTimeout)
    }

    /// Ошибка вызывающей стороны (неверный топик или шаблон).
    pub fn is_client_error(&self) -> bool {
        (2000..=2999).contains(&self.code())
    }

    /// Ошибка, возникшая внутри обработчика сообщений.
    pub fn is_handler_error(&self) -> bool {
        (4000..=4999).contains(&self.code())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "INTERNAL",
            Self::InvalidTopic => "INVALID_TOPIC",
            Self::AlreadyShutDown => "ALREADY_SHUT_DOWN",
            Self::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            Self::TeardownFailed => "TEARDOWN_FAILED",
            Self::HandlerFailed => "HANDLER_FAILED",
            Self::HandlerPanicked => "HANDLER_PANICKED",
            Self::HandlerTimeout => "HANDLER_TIMEOUT",
            Self::QueueClosed => "QUEUE_CLOSED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}

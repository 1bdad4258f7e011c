use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Состояние жизненного цикла брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    /// Создан, цикл доставки не запущен. Публикации копятся в очереди.
    Stopped,
    Running,
    /// После `shutdown()`. Повторный запуск не поддерживается.
    ShutDown,
}

/// Счётчики брокера.
#[derive(Debug, Default)]
pub(crate) struct BrokerMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    dropped_on_shutdown: AtomicU64,
    queue_depth: AtomicUsize,
}

impl BrokerMetrics {
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(
        &self,
        count: u64,
    ) {
        self.dropped_on_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    pub fn enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dequeued(&self) {
        // не уходим ниже нуля, если очередь была сброшена при shutdown
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
    }

    /// Обнуляет глубину очереди, возвращая прежнее значение.
    pub fn reset_queue_depth(&self) -> usize {
        self.queue_depth.swap(0, Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn snapshot(
        &self,
        state: BrokerState,
    ) -> BrokerStats {
        BrokerStats {
            state,
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            exact_topics: 0,
            wildcard_prefixes: 0,
            subscriptions: 0,
        }
    }
}

/// Снимок состояния брокера (health check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub state: BrokerState,
    /// Принятые `publish` (включая отчёты об ошибках).
    pub published: u64,
    /// Успешные вызовы обработчиков.
    pub delivered: u64,
    pub handler_failures: u64,
    /// Сообщения, отброшенные без доставки при `shutdown()`.
    pub dropped_on_shutdown: u64,
    pub queue_depth: usize,
    pub exact_topics: usize,
    pub wildcard_prefixes: usize,
    /// Всего пар (шаблон, обработчик).
    pub subscriptions: usize,
}

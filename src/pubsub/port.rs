//! Интерфейс (порт) брокера сообщений.
//!
//! Трейт описывает операции, доступные компонентам системы:
//! - `publish`: поставить сообщение в очередь;
//! - `subscribe` / `unsubscribe`: управлять подписками;
//! - `request`: запрос/ответ поверх `publish`/`subscribe` (реализован по
//!   умолчанию, см. [`super::request`]).
//!
//! Реализуется [`super::Broker`]; в тестах порт можно подменить.

use std::time::Duration;

use async_trait::async_trait;

use super::{request, Handler, Payload};
use crate::BrokerError;

#[async_trait]
pub trait PubSubPort: Send + Sync {
    /// Поставить сообщение в очередь. Доставка асинхронная.
    fn publish(
        &self,
        topic: &str,
        payload: Payload,
    ) -> Result<(), BrokerError>;

    /// Подписать обработчик на точный топик или wildcard-шаблон.
    fn subscribe(
        &self,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), BrokerError>;

    /// Снять подписку. Возвращает `true`, если пара была зарегистрирована.
    fn unsubscribe(
        &self,
        pattern: &str,
        handler: &Handler,
    ) -> bool;

    /// Таймаут `request`, если вызывающий не задал свой.
    fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(crate::config::broker::DEFAULT_REQUEST_TIMEOUT_MS)
    }

    /// Завершается, когда порт закрыт и ответов больше не будет.
    /// Ожидающий `request` в этот момент возвращает
    /// [`BrokerError::ShutDown`]. По умолчанию не завершается никогда.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }

    /// Опубликовать запрос и дождаться первого ответа на
    /// `"{topic}/response"`.
    async fn request(
        &self,
        topic: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload, BrokerError> {
        let timeout = timeout.unwrap_or_else(|| self.default_request_timeout());
        request::request(self, topic, payload, timeout).await
    }
}

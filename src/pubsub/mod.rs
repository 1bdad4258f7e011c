//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Внутрипроцессная шина сообщений между слабо связанными компонентами:
//!
//! - `broker`: жизненный цикл, публикация и подписки.
//! - `dispatch` (приватный): цикл доставки и отчёты об ошибках
//!   обработчиков.
//! - `handler`: трейт обработчика и адаптер для замыканий.
//! - `matcher`: префиксное и сегментное сопоставление топиков.
//! - `message`: конверт сообщения и payload.
//! - `policy`: необязательный список допустимых топиков.
//! - `port`: трейт-порт брокера, на который опираются компоненты.
//! - `registry` (приватный): индексы подписок.
//! - `request`: запрос/ответ поверх порта.
//! - `stats`: состояние и счётчики.
//! - `topics`: соглашения об именах топиков.
//!
//! Публичный API переэкспортирует основные типы модулей.

pub mod broker;
mod dispatch;
pub mod handler;
pub mod matcher;
pub mod message;
pub mod policy;
pub mod port;
mod registry;
pub mod request;
pub mod stats;
pub mod topics;

pub use broker::Broker;
pub use dispatch::{error_report, DeliveryFailure, ERROR_SOURCE};
pub use handler::*;
pub use message::*;
pub use policy::TopicPolicy;
pub use port::PubSubPort;
pub use registry::SubscriptionKind;
pub use stats::{BrokerState, BrokerStats};

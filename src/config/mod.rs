//! Конфигурация брокера и приложения.
//!
//! - `broker`: параметры брокера (таймауты, топик ошибок, политика топиков).
//! - `settings`: загрузка всей конфигурации из значений по умолчанию и
//!   переменных окружения `MCS_*`.

pub mod broker;
pub mod settings;

pub use broker::BrokerConfig;
pub use settings::Settings;

use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};

use super::broker::{
    BrokerConfig, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_SHUTDOWN_GRACE_MS,
};
use crate::logging::LoggingConfig;

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "MCS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и переменных окружения
    /// `MCS_*` (например `MCS_BROKER__REQUEST_TIMEOUT_MS=2000`,
    /// `MCS_BROKER__VALID_TOPICS=tag/set,tag/get`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::environment())
    }

    /// То же, что [`Settings::load`], но с явно заданным источником
    /// окружения.
    pub fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("broker.request_timeout_ms", DEFAULT_REQUEST_TIMEOUT_MS)?
            .set_default("broker.retry_backoff_ms", DEFAULT_RETRY_BACKOFF_MS)?
            .set_default("broker.shutdown_grace_ms", DEFAULT_SHUTDOWN_GRACE_MS)?
            .set_default("logging.level", "info")?
            // Переменные окружения с префиксом MCS_
            .add_source(env)
            .build()?;

        cfg.try_deserialize()
    }

    /// Источник окружения с разделителем `__` для вложенных ключей и
    /// списками через запятую.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("broker.valid_topics")
            .try_parsing(true)
    }
}

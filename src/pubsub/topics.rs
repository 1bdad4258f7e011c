//! Соглашения об именах топиков, на которые опираются потребители брокера.
//!
//! Сам брокер знает только о топике ошибок и суффиксе ответа; остальные
//! имена принадлежат подсистемам (теги, конфигурация) и собраны здесь, чтобы
//! не размножать строковые литералы.

/// Топик отчётов об ошибках обработчиков.
pub const ERROR: &str = "error";
/// Суффикс топика ответа для request/reply.
pub const RESPONSE_SUFFIX: &str = "/response";

/// Запись значения тега (поле `tag` в payload).
pub const TAG_SET: &str = "tag/set";
/// Чтение значения тега (поле `tag` в payload).
pub const TAG_GET: &str = "tag/get";
/// Префикс рассылки изменений конфигурации.
pub const CONFIG_UPDATE_PREFIX: &str = "config/update/";

/// Топик, на который отвечают на запрос к `topic`.
pub fn response_topic(topic: &str) -> String {
    format!("{topic}{RESPONSE_SUFFIX}")
}

/// Топик рассылки изменений конфигурации данного типа.
pub fn config_update_topic(config_type: &str) -> String {
    format!("{CONFIG_UPDATE_PREFIX}{config_type}")
}

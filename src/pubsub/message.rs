use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Полезная нагрузка сообщения: произвольный набор полей.
///
/// Брокер не проверяет схему и не изменяет содержимое.
pub type Payload = Map<String, Value>;

/// Неизменяемая единица обмена: топик и полезная нагрузка.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: Arc<str>,
    pub payload: Payload,
    /// Момент публикации (не записывается в payload).
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(
        topic: impl Into<Arc<str>>,
        payload: Payload,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// Значение поля payload по ключу.
    pub fn get(
        &self,
        field: &str,
    ) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Забирает payload, отбрасывая конверт.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Строит [`Payload`] из JSON-объекта.
///
/// Значения, не являющиеся объектом, кладутся под ключ `"value"`.
pub fn payload_from(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

use std::collections::HashSet;

use crate::{pubsub::matcher, BrokerError};

/// Политика допустимых топиков.
///
/// Пустой список означает, что разрешено всё, включая пустую строку.
/// Иначе разрешены:
/// - перечисленные топики;
/// - топик ошибок;
/// - `"{топик}/response"` для перечисленных топиков;
/// - wildcard-шаблоны, префикс которых начинает хотя бы один перечисленный
///   топик.
#[derive(Debug, Clone, Default)]
pub struct TopicPolicy {
    valid: HashSet<String>,
    error_topic: String,
}

impl TopicPolicy {
    pub fn new<I, S>(
        topics: I,
        error_topic: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            valid: topics.into_iter().map(Into::into).collect(),
            error_topic: error_topic.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.valid.is_empty()
    }

    /// Проверка топика публикации (или точной подписки).
    pub fn check_topic(
        &self,
        topic: &str,
    ) -> Result<(), BrokerError> {
        if self.is_open() || topic == self.error_topic || self.valid.contains(topic) {
            return Ok(());
        }
        if let Some(base) = topic.strip_suffix(super::topics::RESPONSE_SUFFIX) {
            if self.valid.contains(base) {
                return Ok(());
            }
        }
        Err(BrokerError::invalid_topic(topic, "topic is not registered"))
    }

    /// Проверка шаблона подписки.
    pub fn check_pattern(
        &self,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        let Some(prefix) = matcher::wildcard_prefix(pattern) else {
            return self.check_topic(pattern);
        };
        if self.is_open() || self.valid.iter().any(|t| matcher::prefix_matches(prefix, t)) {
            Ok(())
        } else {
            Err(BrokerError::invalid_topic(
                pattern,
                "pattern matches no registered topic",
            ))
        }
    }
}

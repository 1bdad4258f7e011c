use std::sync::Arc;

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use super::{matcher, Handler};

/// Вид подписки, определяемый при `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Точное совпадение топика.
    Exact,
    /// Префикс до первой `*` в шаблоне.
    Wildcard { prefix: Arc<str> },
}

impl SubscriptionKind {
    pub fn classify(pattern: &str) -> Self {
        match matcher::wildcard_prefix(pattern) {
            Some(prefix) => Self::Wildcard {
                prefix: Arc::from(prefix),
            },
            None => Self::Exact,
        }
    }
}

/// Обработчики одной записи: порядок регистрации, без повторов.
type HandlerSet = IndexSet<Handler>;

/// Реестр подписок: два независимых индекса.
///
/// - точные топики → обработчики (`DashMap`);
/// - wildcard-префиксы → обработчики, в порядке создания префикса.
///
/// Поиск записи и проверка повтора выполняются по хешу. Удаление сдвигает
/// хвост записи, чтобы порядок регистрации сохранялся.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    exact: DashMap<Arc<str>, HandlerSet>,
    wildcard: RwLock<IndexMap<Arc<str>, HandlerSet>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет подписку. Возвращает `false`, если пара уже была
    /// зарегистрирована.
    pub fn insert(
        &self,
        pattern: &str,
        handler: Handler,
    ) -> (SubscriptionKind, bool) {
        let kind = SubscriptionKind::classify(pattern);
        let added = match &kind {
            SubscriptionKind::Exact => self
                .exact
                .entry(Arc::from(pattern))
                .or_default()
                .value_mut()
                .insert(handler),
            SubscriptionKind::Wildcard { prefix } => self
                .wildcard
                .write()
                .entry(prefix.clone())
                .or_default()
                .insert(handler),
        };
        (kind, added)
    }

    /// Удаляет обработчик из обоих индексов.
    ///
    /// Точный индекс проверяется по шаблону как есть, wildcard-индекс по
    /// префиксу шаблона (или по шаблону целиком, если `*` в нём нет).
    /// Возвращает `true`, если что-то было удалено.
    pub fn remove(
        &self,
        pattern: &str,
        handler: &Handler,
    ) -> bool {
        let mut removed = false;

        if let Some(mut entry) = self.exact.get_mut(pattern) {
            removed |= entry.value_mut().shift_remove(handler);
        }
        self.exact.remove_if(pattern, |_, handlers| handlers.is_empty());

        let prefix = matcher::wildcard_prefix(pattern).unwrap_or(pattern);
        let mut entries = self.wildcard.write();
        if let Some(handlers) = entries.get_mut(prefix) {
            removed |= handlers.shift_remove(handler);
            if handlers.is_empty() {
                entries.shift_remove(prefix);
            }
        }

        removed
    }

    /// Снимок получателей для топика: сначала точные подписчики, затем
    /// wildcard-подписчики всех подходящих префиксов.
    ///
    /// Возвращает копию, чтобы обработчики могли менять подписки во время
    /// доставки.
    pub fn recipients(
        &self,
        topic: &str,
    ) -> Vec<Handler> {
        let mut out: Vec<Handler> = self
            .exact
            .get(topic)
            .map(|entry| entry.value().iter().cloned().collect())
            .unwrap_or_default();

        for (prefix, handlers) in self.wildcard.read().iter() {
            if matcher::prefix_matches(prefix, topic) {
                out.extend(handlers.iter().cloned());
            }
        }
        out
    }

    /// Точные топики, у которых есть подписчики.
    pub fn exact_topics(&self) -> Vec<Arc<str>> {
        let mut topics: Vec<_> = self.exact.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn wildcard_prefixes(&self) -> Vec<Arc<str>> {
        self.wildcard.read().keys().cloned().collect()
    }

    /// Общее число пар (шаблон, обработчик).
    pub fn len(&self) -> usize {
        let exact: usize = self.exact.iter().map(|e| e.value().len()).sum();
        let wildcard: usize = self.wildcard.read().values().map(|h| h.len()).sum();
        exact + wildcard
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.exact.clear();
        self.wildcard.write().clear();
    }
}

//! Сопоставление топиков.
//!
//! Здесь живут два независимых алгоритма:
//!
//! - префиксный (`wildcard_prefix` + `prefix_matches`) используется циклом
//!   доставки для подписок с `*`;
//! - сегментный (`topic_matches`) используется для запросов по множеству
//!   топиков и в доставку не подключён.
//!
//! Семантика у них разная: `"tag/*/x"` при доставке получит любой топик,
//! начинающийся с `"tag/"`, а сегментный матчер потребует ровно три сегмента.

/// Разделитель сегментов топика.
pub const SEGMENT_SEPARATOR: char = '/';
/// Один произвольный сегмент (и маркер wildcard-подписки).
pub const SINGLE_WILDCARD: &str = "*";
/// Ноль или более хвостовых сегментов.
pub const MULTI_WILDCARD: &str = "#";

/// Литеральный префикс wildcard-шаблона: всё до первой `*`.
///
/// Возвращает `None`, если в шаблоне нет `*` (точная подписка).
pub fn wildcard_prefix(pattern: &str) -> Option<&str> {
    pattern.find('*').map(|idx| &pattern[..idx])
}

/// Является ли шаблон wildcard-подпиской.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Префиксное сопоставление, используемое при доставке.
#[inline]
pub fn prefix_matches(
    prefix: &str,
    topic: &str,
) -> bool {
    topic.starts_with(prefix)
}

/// Сегментное сопоставление шаблона с топиком.
///
/// - `*` совпадает ровно с одним сегментом;
/// - `#` совпадает с нулём или более хвостовых сегментов и завершает
///   сопоставление (сегменты шаблона после него не рассматриваются);
/// - остальные сегменты сравниваются точно.
pub fn topic_matches(
    pattern: &str,
    topic: &str,
) -> bool {
    let mut topic_parts = topic.split(SEGMENT_SEPARATOR);

    for p in pattern.split(SEGMENT_SEPARATOR) {
        if p == MULTI_WILDCARD {
            return true;
        }

        let Some(t) = topic_parts.next() else {
            return false;
        };

        if p != SINGLE_WILDCARD && p != t {
            return false;
        }
    }

    // весь шаблон пройден, в топике не должно остаться сегментов
    topic_parts.next().is_none()
}

/// Отбирает топики, подходящие под сегментный шаблон, сохраняя порядок.
pub fn filter_topics<'a, I>(
    pattern: &str,
    topics: I,
) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    topics
        .into_iter()
        .filter(|topic| topic_matches(pattern, topic))
        .collect()
}

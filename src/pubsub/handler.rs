use std::{
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    sync::Arc,
};

use async_trait::async_trait;

use super::Envelope;

/// Результат работы обработчика.
///
/// Ошибка не возвращается издателю: цикл доставки превращает её в
/// сообщение топика `error`.
pub type HandlerResult = anyhow::Result<()>;

/// Асинхронный потребитель сообщений.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        envelope: Envelope,
    ) -> HandlerResult;
}

/// Разделяемая ссылка на обработчик.
///
/// Идентичность определяется указателем: клоны одного `Handler` равны,
/// два независимо созданных обработчика не равны, даже если делают одно и
/// то же. По этой идентичности работают `subscribe` и `unsubscribe`.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<dyn MessageHandler>,
}

/// Числовой идентификатор обработчика (для логов).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

impl Handler {
    pub fn new<H: MessageHandler>(handler: H) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub fn from_arc(handler: Arc<dyn MessageHandler>) -> Self {
        Self { inner: handler }
    }

    pub fn id(&self) -> HandlerId {
        HandlerId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub async fn call(
        &self,
        envelope: Envelope,
    ) -> HandlerResult {
        self.inner.handle(envelope).await
    }
}

impl PartialEq for Handler {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Handler {}

impl Hash for Handler {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Handler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.id()).finish()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Обработчик на основе замыкания, см. [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(
        &self,
        envelope: Envelope,
    ) -> HandlerResult {
        (self.f)(envelope).await
    }
}

/// Создаёт [`Handler`] из асинхронного замыкания.
///
/// ```ignore
/// let h = handler_fn(|env| async move {
///     tracing::info!(topic = %env.topic, "got it");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Handler::new(FnHandler { f })
}

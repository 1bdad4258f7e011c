use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    dispatch, matcher,
    registry::{SubscriptionKind, SubscriptionRegistry},
    request,
    stats::{BrokerMetrics, BrokerState, BrokerStats},
    Envelope, Handler, Payload, PubSubPort, TopicPolicy,
};
use crate::{config::BrokerConfig, BrokerError};

/// Состояние, общее для брокера и цикла доставки.
pub(crate) struct Shared {
    pub registry: SubscriptionRegistry,
    pub config: BrokerConfig,
    pub policy: TopicPolicy,
    pub metrics: BrokerMetrics,
    /// Сигнал остановки. Его ждут цикл доставки и незавершённые `request`.
    pub shutdown: CancellationToken,
    sender: UnboundedSender<Envelope>,
}

impl Shared {
    /// Ставит сообщение в очередь без проверок состояния и политики.
    pub fn enqueue(
        &self,
        envelope: Envelope,
    ) -> Result<(), BrokerError> {
        // счётчик растёт до отправки: цикл может забрать сообщение раньше,
        // чем send() вернёт управление
        self.metrics.enqueued();
        if let Err(e) = self.sender.send(envelope) {
            self.metrics.dequeued();
            return Err(BrokerError::QueueClosed {
                topic: e.0.topic.to_string(),
            });
        }
        self.metrics.record_published();
        Ok(())
    }
}

struct Lifecycle {
    state: BrokerState,
    /// Приёмник очереди до `start()`.
    receiver: Option<UnboundedReceiver<Envelope>>,
    /// Задача цикла доставки; возвращает приёмник при завершении.
    task: Option<JoinHandle<UnboundedReceiver<Envelope>>>,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        // последний дескриптор брокера исчез без shutdown()
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Внутрипроцессный брокер сообщений.
///
/// Поддерживает:
/// - точные подписки и wildcard-подписки по префиксу до первой `*`;
/// - асинхронную доставку через единственный цикл, по одному сообщению и
///   по одному обработчику за раз;
/// - изоляцию сбоев обработчиков с отчётами в топик ошибок;
/// - запрос/ответ через `"{topic}/response"`.
///
/// `Broker` дешево клонируется: все клоны работают с одним состоянием.
/// Брокер создаётся явно и передаётся компонентам.
#[derive(Clone)]
pub struct Broker {
    shared: Arc<Shared>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Broker {
    /// Создаёт брокер в состоянии [`BrokerState::Stopped`].
    ///
    /// Публикации до `start()` принимаются и ждут в очереди.
    pub fn new(config: BrokerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let policy = TopicPolicy::new(config.valid_topics.iter().cloned(), &config.error_topic);
        Self {
            shared: Arc::new(Shared {
                registry: SubscriptionRegistry::new(),
                policy,
                metrics: BrokerMetrics::default(),
                shutdown: CancellationToken::new(),
                sender,
                config,
            }),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: BrokerState::Stopped,
                receiver: Some(receiver),
                task: None,
            })),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> BrokerState {
        self.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == BrokerState::Running
    }

    /// Запускает цикл доставки в текущем tokio runtime.
    ///
    /// Повторный вызов только пишет предупреждение. После `shutdown()`
    /// возвращает [`BrokerError::ShutDown`].
    pub fn start(&self) -> Result<(), BrokerError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            BrokerState::Running => {
                warn!("Message broker is already running");
                return Ok(());
            }
            BrokerState::ShutDown => return Err(BrokerError::ShutDown),
            BrokerState::Stopped => {}
        }

        let runtime =
            Handle::try_current().map_err(|e| BrokerError::RuntimeUnavailable(e.to_string()))?;
        let receiver = lifecycle.receiver.take().ok_or_else(|| {
            BrokerError::RuntimeUnavailable("dispatch queue receiver is missing".to_string())
        })?;

        lifecycle.task = Some(runtime.spawn(dispatch::run(self.shared.clone(), receiver)));
        lifecycle.state = BrokerState::Running;
        info!(
            queued = self.shared.metrics.queue_depth(),
            "Message broker started"
        );
        Ok(())
    }

    /// Останавливает брокер.
    ///
    /// Ждёт завершения цикла не дольше `shutdown_grace`, затем прерывает
    /// его вместе с выполняющимся обработчиком. Оставшиеся в очереди
    /// сообщения отбрасываются без доставки, все подписки удаляются,
    /// ожидающие `request` получают [`BrokerError::ShutDown`]. Повторный
    /// вызов ничего не делает.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        let (task, mut receiver) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == BrokerState::ShutDown {
                debug!("Message broker is already shut down");
                return Ok(());
            }
            lifecycle.state = BrokerState::ShutDown;
            (lifecycle.task.take(), lifecycle.receiver.take())
        };

        self.shared.shutdown.cancel();

        let mut teardown = Ok(());
        if let Some(mut task) = task {
            let grace = self.shared.config.shutdown_grace();
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(rx)) => receiver = Some(rx),
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => teardown = Err(BrokerError::Teardown(e.to_string())),
                Err(_) => {
                    warn!(?grace, "Dispatch loop did not stop in time, aborting");
                    task.abort();
                    // отмена ожидаема
                    let _ = task.await;
                }
            }
        }

        let drained = receiver.map(|mut rx| drain(&mut rx));
        let depth = self.shared.metrics.reset_queue_depth();
        // при прерванном цикле приёмник потерян вместе с содержимым
        let lost = drained.unwrap_or(depth);
        self.shared.metrics.record_dropped(lost as u64);
        self.shared.registry.clear();

        info!(dropped = lost, "Message broker shut down");
        teardown
    }

    /// Подписывает обработчик на топик или wildcard-шаблон.
    ///
    /// Повторная подписка той же пары ничего не меняет.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared.policy.check_pattern(pattern)?;

        let handler_id = handler.id();
        let (kind, added) = self.shared.registry.insert(pattern, handler);
        match kind {
            SubscriptionKind::Exact => {
                debug!(topic = pattern, handler = %handler_id, added, "Subscribed")
            }
            SubscriptionKind::Wildcard { prefix } => {
                debug!(pattern, prefix = %prefix, handler = %handler_id, added, "Subscribed to wildcard")
            }
        }
        Ok(())
    }

    /// Снимает подписку. Неизвестная пара не является ошибкой.
    pub fn unsubscribe(
        &self,
        pattern: &str,
        handler: &Handler,
    ) -> bool {
        let removed = self.shared.registry.remove(pattern, handler);
        debug!(pattern, handler = %handler.id(), removed, "Unsubscribed");
        removed
    }

    /// Ставит сообщение в очередь и сразу возвращается.
    ///
    /// Отклонённый политикой топик порождает отчёт в топике ошибок и
    /// [`BrokerError::InvalidTopic`].
    pub fn publish(
        &self,
        topic: &str,
        payload: Payload,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;

        if let Err(err) = self.shared.policy.check_topic(topic) {
            warn!(topic, error = %err, "Rejected publish");
            let report = dispatch::rejection_report(&err, topic, &payload);
            self.shared.enqueue(Envelope::new(
                self.shared.config.error_topic.as_str(),
                report,
            ))?;
            return Err(err);
        }

        self.shared.enqueue(Envelope::new(topic, payload))?;
        trace!(topic, "Message queued");
        Ok(())
    }

    /// Публикует запрос и ждёт ответ на `"{topic}/response"`.
    ///
    /// Без явного `timeout` используется `request_timeout` из конфигурации.
    pub async fn request(
        &self,
        topic: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload, BrokerError> {
        let timeout = timeout.unwrap_or_else(|| self.shared.config.request_timeout());
        request::request(self, topic, payload, timeout).await
    }

    /// Зарегистрированные точные топики, подходящие под сегментный шаблон
    /// (`*` совпадает с одним сегментом, `#` с любым хвостом).
    pub fn topics_matching(
        &self,
        pattern: &str,
    ) -> Vec<String> {
        let topics = self.shared.registry.exact_topics();
        matcher::filter_topics(pattern, topics.iter().map(|t| &**t))
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Сколько обработчиков получит сообщение, опубликованное в `topic`.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.shared.registry.recipients(topic).len()
    }

    pub fn stats(&self) -> BrokerStats {
        let registry = &self.shared.registry;
        BrokerStats {
            exact_topics: registry.exact_topics().len(),
            wildcard_prefixes: registry.wildcard_prefixes().len(),
            subscriptions: registry.len(),
            ..self.shared.metrics.snapshot(self.state())
        }
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.state() == BrokerState::ShutDown {
            return Err(BrokerError::ShutDown);
        }
        Ok(())
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state())
            .field("subscriptions", &self.shared.registry.len())
            .finish()
    }
}

#[async_trait]
impl PubSubPort for Broker {
    fn publish(
        &self,
        topic: &str,
        payload: Payload,
    ) -> Result<(), BrokerError> {
        Broker::publish(self, topic, payload)
    }

    fn subscribe(
        &self,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), BrokerError> {
        Broker::subscribe(self, pattern, handler)
    }

    fn unsubscribe(
        &self,
        pattern: &str,
        handler: &Handler,
    ) -> bool {
        Broker::unsubscribe(self, pattern, handler)
    }

    fn default_request_timeout(&self) -> Duration {
        self.shared.config.request_timeout()
    }

    async fn closed(&self) {
        self.shared.shutdown.cancelled().await
    }
}

/// Закрывает очередь и отбрасывает её содержимое.
fn drain(rx: &mut UnboundedReceiver<Envelope>) -> usize {
    rx.close();
    let mut dropped = 0;
    while let Ok(envelope) = rx.try_recv() {
        trace!(topic = %envelope.topic, "Dropped on shutdown");
        dropped += 1;
    }
    dropped
}

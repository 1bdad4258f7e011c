use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{handler_fn, topics, Envelope, Handler, Payload, PubSubPort};
use crate::BrokerError;

/// Временная подписка на топик ответа. Снимается при выходе из
/// [`request`] любым путём, включая отмену future.
struct ReplySubscription<'a, P: PubSubPort + ?Sized> {
    port: &'a P,
    topic: &'a str,
    handler: &'a Handler,
}

impl<P: PubSubPort + ?Sized> Drop for ReplySubscription<'_, P> {
    fn drop(&mut self) {
        if !self.port.unsubscribe(self.topic, self.handler) {
            debug!(topic = self.topic, "Reply subscription already removed");
        }
    }
}

/// Запрос/ответ поверх обычных `publish` и `subscribe`.
///
/// 1. Подписывает одноразовый обработчик на `"{topic}/response"`.
/// 2. Публикует `payload` на `topic`.
/// 3. Ждёт первый ответ не дольше `timeout` или до закрытия порта.
///
/// Корреляции по идентификатору нет: ответом считается первое сообщение
/// на топике ответа, в том числе предназначенное другому запросу.
/// Последующие ответы игнорируются.
pub async fn request<P>(
    port: &P,
    topic: &str,
    payload: Payload,
    timeout: Duration,
) -> Result<Payload, BrokerError>
where
    P: PubSubPort + ?Sized,
{
    let reply_topic = topics::response_topic(topic);
    let (tx, rx) = oneshot::channel::<Envelope>();
    let slot = Arc::new(Mutex::new(Some(tx)));

    let handler = handler_fn(move |envelope| {
        let slot = slot.clone();
        async move {
            if let Some(tx) = slot.lock().take() {
                // получатель мог уже уйти по таймауту
                let _ = tx.send(envelope);
            }
            Ok(())
        }
    });

    port.subscribe(&reply_topic, handler.clone())?;
    let _reply = ReplySubscription {
        port,
        topic: &reply_topic,
        handler: &handler,
    };

    port.publish(topic, payload)?;
    debug!(topic, reply_topic = %reply_topic, ?timeout, "Request published");

    let reply = tokio::select! {
        biased;
        reply = tokio::time::timeout(timeout, rx) => reply,
        _ = port.closed() => {
            debug!(topic, "Port closed while waiting for reply");
            return Err(BrokerError::ShutDown);
        }
    };

    match reply {
        Ok(Ok(reply)) => Ok(reply.into_payload()),
        Ok(Err(_)) => Err(BrokerError::ShutDown),
        Err(_) => {
            warn!(topic, ?timeout, "Request timed out");
            Err(BrokerError::Timeout {
                topic: topic.to_string(),
                timeout,
            })
        }
    }
}

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use mcs_bus::{
    handler_fn, payload_from, topics, Broker, BrokerConfig, BrokerError, BrokerState, Envelope,
    Handler, Payload,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

/// Собирает всё, что пришло в обработчик.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Envelope>>>,
}

impl Recorder {
    fn handler(&self) -> Handler {
        let seen = self.seen.clone();
        handler_fn(move |env| {
            let seen = seen.clone();
            async move {
                seen.lock().push(env);
                Ok(())
            }
        })
    }

    fn len(&self) -> usize {
        self.seen.lock().len()
    }

    fn topics(&self) -> Vec<String> {
        self.seen.lock().iter().map(|e| e.topic.to_string()).collect()
    }

    fn payloads(&self) -> Vec<Payload> {
        self.seen.lock().iter().map(|e| e.payload.clone()).collect()
    }
}

/// Обработчик, дописывающий свою метку в общий журнал.
fn labeled(
    label: &'static str,
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> Handler {
    let log = log.clone();
    handler_fn(move |_| {
        let log = log.clone();
        async move {
            log.lock().push(label);
            Ok(())
        }
    })
}

fn failing(message: &'static str) -> Handler {
    handler_fn(move |_| async move { anyhow::bail!(message) })
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met in time");
}

/// Тест проверяет, что сообщения доставляются в порядке публикации.
#[tokio::test]
async fn test_delivery_preserves_publish_order() {
    let broker = Broker::default();
    let rec = Recorder::default();
    broker.subscribe("seq", rec.handler()).unwrap();
    broker.start().unwrap();

    for n in 0..50 {
        broker.publish("seq", payload_from(json!({ "n": n }))).unwrap();
    }
    wait_until(|| rec.len() == 50).await;

    let order: Vec<i64> = rec
        .payloads()
        .iter()
        .map(|p| p["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    broker.shutdown().await.unwrap();
}

/// Тест проверяет порядок вызова: точные подписчики в порядке регистрации,
/// затем wildcard.
#[tokio::test]
async fn test_exact_handlers_run_before_wildcard() {
    let broker = Broker::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    broker.subscribe("a/*", labeled("wildcard", &log)).unwrap();
    broker.subscribe("a/b", labeled("first", &log)).unwrap();
    broker.subscribe("a/b", labeled("second", &log)).unwrap();
    broker.start().unwrap();

    broker.publish("a/b", Payload::new()).unwrap();
    wait_until(|| log.lock().len() == 3).await;

    assert_eq!(*log.lock(), vec!["first", "second", "wildcard"]);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет рассылку нескольким подписчикам и отписку между
/// публикациями.
#[tokio::test]
async fn test_fan_out_with_unsubscribe() {
    let broker = Broker::default();
    let (r1, r2) = (Recorder::default(), Recorder::default());
    let h2 = r2.handler();
    broker.subscribe("news", r1.handler()).unwrap();
    broker.subscribe("news", h2.clone()).unwrap();
    broker.start().unwrap();

    broker.publish("news", payload_from(json!({ "n": 1 }))).unwrap();
    wait_until(|| r1.len() == 1 && r2.len() == 1).await;

    assert!(broker.unsubscribe("news", &h2));
    assert!(!broker.unsubscribe("news", &h2));
    broker.publish("news", payload_from(json!({ "n": 2 }))).unwrap();
    wait_until(|| r1.len() == 2).await;

    assert_eq!(r2.len(), 1);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет, что отписка во время доставки не влияет на текущее
/// сообщение: список получателей снимается заранее.
#[tokio::test]
async fn test_unsubscribe_during_delivery_uses_snapshot() {
    let broker = Broker::default();
    let late = Recorder::default();
    let late_handler = late.handler();

    let b = broker.clone();
    let target = late_handler.clone();
    broker
        .subscribe(
            "evt",
            handler_fn(move |_| {
                let b = b.clone();
                let target = target.clone();
                async move {
                    b.unsubscribe("evt", &target);
                    Ok(())
                }
            }),
        )
        .unwrap();
    broker.subscribe("evt", late_handler).unwrap();
    broker.start().unwrap();

    broker.publish("evt", Payload::new()).unwrap();
    broker.publish("evt", Payload::new()).unwrap();
    wait_until(|| broker.stats().delivered >= 3).await;

    assert_eq!(late.len(), 1);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет, что обработчик может подписаться во время доставки.
#[tokio::test]
async fn test_subscribe_during_delivery() {
    let broker = Broker::default();
    let rec = Recorder::default();
    let b = broker.clone();
    let h = rec.handler();
    broker
        .subscribe(
            "setup",
            handler_fn(move |_| {
                let (b, h) = (b.clone(), h.clone());
                async move {
                    b.subscribe("later", h)?;
                    b.publish("later", Payload::new())?;
                    Ok(())
                }
            }),
        )
        .unwrap();
    broker.start().unwrap();

    broker.publish("setup", Payload::new()).unwrap();
    wait_until(|| rec.len() == 1).await;
    assert_eq!(rec.topics(), vec!["later"]);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет, что пустая строка является обычным топиком.
#[tokio::test]
async fn test_empty_topic_is_valid() {
    let broker = Broker::default();
    let rec = Recorder::default();
    broker.subscribe("", rec.handler()).unwrap();
    broker.start().unwrap();

    broker.publish("", payload_from(json!({ "n": 1 }))).unwrap();
    wait_until(|| rec.len() == 1).await;

    assert_eq!(rec.topics(), vec![""]);
    assert_eq!(broker.stats().handler_failures, 0);
    assert_eq!(broker.stats().published, 1);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет префиксную семантику wildcard-подписки.
#[tokio::test]
async fn test_wildcard_prefix_matching() {
    let broker = Broker::default();
    let rec = Recorder::default();
    broker.subscribe("hardware/*", rec.handler()).unwrap();
    broker.start().unwrap();

    for t in ["hardware/status", "hw/status", "hardware/status/updated"] {
        broker.publish(t, Payload::new()).unwrap();
    }
    wait_until(|| broker.stats().queue_depth == 0 && rec.len() == 2).await;

    assert_eq!(
        rec.topics(),
        vec!["hardware/status", "hardware/status/updated"]
    );
    broker.shutdown().await.unwrap();
}

/// Тест проверяет изоляцию: ошибка и паника одного обработчика не мешают
/// остальным, а в топик ошибок уходят отчёты с контекстом.
#[tokio::test]
async fn test_handler_failures_are_isolated() {
    let broker = Broker::default();
    let good = Recorder::default();
    let errors = Recorder::default();

    broker.subscribe("work", failing("bad input")).unwrap();
    broker
        .subscribe(
            "work",
            handler_fn(|env: Envelope| async move {
                if env.get("n").is_some() {
                    panic!("handler exploded");
                }
                Ok(())
            }),
        )
        .unwrap();
    broker.subscribe("work", good.handler()).unwrap();
    broker.subscribe(topics::ERROR, errors.handler()).unwrap();
    broker.start().unwrap();

    broker
        .publish("work", payload_from(json!({ "n": 1, "request_id": "req-1" })))
        .unwrap();
    wait_until(|| good.len() == 1 && errors.len() == 2).await;

    let reports = errors.payloads();
    for report in &reports {
        assert_eq!(report["source"], json!("message_broker"));
        assert_eq!(report["topic"], json!("work"));
        assert_eq!(report["payload"]["n"], json!(1));
        assert_eq!(report["request_id"], json!("req-1"));
    }
    assert_eq!(reports[0]["error"], json!("bad input"));
    assert_eq!(reports[0]["status"], json!("HANDLER_FAILED"));
    assert!(reports[1]["error"]
        .as_str()
        .unwrap()
        .contains("handler exploded"));
    assert_eq!(reports[1]["status"], json!("HANDLER_PANICKED"));
    assert_eq!(broker.stats().handler_failures, 2);

    // брокер продолжает работать
    broker.publish("work", Payload::new()).unwrap();
    wait_until(|| good.len() == 2).await;
    broker.shutdown().await.unwrap();
}

/// Тест проверяет, что сбой обработчика топика ошибок не порождает новых
/// отчётов.
#[tokio::test]
async fn test_error_topic_failure_is_not_republished() {
    let broker = Broker::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    broker
        .subscribe(
            topics::ERROR,
            handler_fn(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("error sink is broken")
                }
            }),
        )
        .unwrap();
    broker.subscribe("job", failing("job failed")).unwrap();
    broker.start().unwrap();

    broker.publish("job", Payload::new()).unwrap();
    wait_until(|| broker.stats().handler_failures == 2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.stats().handler_failures, 2);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет таймаут обработчика: зависший обработчик прерывается,
/// доставка продолжается.
#[tokio::test(start_paused = true)]
async fn test_handler_timeout_reports_error() {
    let broker = Broker::new(BrokerConfig::default().with_handler_timeout(Duration::from_millis(30)));
    let errors = Recorder::default();
    let after = Recorder::default();
    broker
        .subscribe(
            "slow",
            handler_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        )
        .unwrap();
    broker.subscribe("slow", after.handler()).unwrap();
    broker.subscribe(topics::ERROR, errors.handler()).unwrap();
    broker.start().unwrap();

    broker.publish("slow", Payload::new()).unwrap();
    wait_until(|| after.len() == 1 && errors.len() == 1).await;

    assert_eq!(errors.payloads()[0]["status"], json!("HANDLER_TIMEOUT"));
    broker.shutdown().await.unwrap();
}

/// Тест проверяет запрос с ответом и отсутствие остаточной подписки.
#[tokio::test]
async fn test_request_reply() {
    let broker = Broker::default();
    let responder = broker.clone();
    broker
        .subscribe(
            topics::TAG_GET,
            handler_fn(move |env| {
                let responder = responder.clone();
                async move {
                    let tag = env.get("tag").cloned().unwrap_or_default();
                    responder.publish(
                        &topics::response_topic(topics::TAG_GET),
                        payload_from(json!({ "tag": tag, "value": 42 })),
                    )?;
                    Ok(())
                }
            }),
        )
        .unwrap();
    broker.start().unwrap();

    let reply = broker
        .request(
            topics::TAG_GET,
            payload_from(json!({ "tag": "t1" })),
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    assert_eq!(reply["tag"], json!("t1"));
    assert_eq!(reply["value"], json!(42));
    assert_eq!(broker.subscriber_count("tag/get/response"), 0);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет таймаут запроса без ответчика и очистку подписки.
#[tokio::test]
async fn test_request_timeout_leaves_no_subscription() {
    let broker = Broker::new(BrokerConfig::default().with_request_timeout(Duration::from_millis(50)));
    broker.start().unwrap();

    let err = broker
        .request("plc/read", Payload::new(), None)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, BrokerError::Timeout { ref topic, .. } if topic == "plc/read"));
    assert_eq!(broker.subscriber_count("plc/read/response"), 0);
    assert_eq!(broker.stats().subscriptions, 0);

    // следующий запрос получает свой ответ, старый обработчик не мешает
    let responder = broker.clone();
    broker
        .subscribe(
            "plc/read",
            handler_fn(move |_| {
                let responder = responder.clone();
                async move {
                    responder.publish("plc/read/response", payload_from(json!({ "ok": true })))?;
                    Ok(())
                }
            }),
        )
        .unwrap();
    let reply = broker
        .request("plc/read", Payload::new(), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(broker.subscriber_count("plc/read/response"), 0);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет, что запрос после shutdown отклоняется сразу.
#[tokio::test]
async fn test_request_after_shutdown() {
    let broker = Broker::default();
    broker.start().unwrap();
    broker.shutdown().await.unwrap();

    let err = broker.request("x", Payload::new(), None).await.unwrap_err();
    assert_eq!(err, BrokerError::ShutDown);
}

/// Тест проверяет, что ожидающий ответа запрос завершается сразу при
/// shutdown, не дожидаясь таймаута.
#[tokio::test]
async fn test_pending_request_fails_on_shutdown() {
    let broker = Broker::default();
    broker.start().unwrap();

    let b = broker.clone();
    let pending = tokio::spawn(async move {
        b.request("ping", Payload::new(), Some(Duration::from_secs(2)))
            .await
    });
    wait_until(|| broker.subscriber_count("ping/response") == 1).await;

    let started = std::time::Instant::now();
    broker.shutdown().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();

    assert_eq!(err, BrokerError::ShutDown);
    assert!(started.elapsed() < Duration::from_secs(1));
}

/// Тест проверяет, что shutdown дожидается текущей доставки, а остальное
/// отбрасывает.
#[tokio::test]
async fn test_shutdown_drains_queue() {
    let broker = Broker::default();
    let rec = Recorder::default();
    let entered = Arc::new(Notify::new());
    let e = entered.clone();
    let h = rec.handler();
    broker
        .subscribe(
            "batch",
            handler_fn(move |env| {
                let (e, h) = (e.clone(), h.clone());
                async move {
                    e.notify_one();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    h.call(env).await
                }
            }),
        )
        .unwrap();

    for n in 0..5 {
        broker.publish("batch", payload_from(json!({ "n": n }))).unwrap();
    }
    broker.start().unwrap();
    entered.notified().await;
    broker.shutdown().await.unwrap();

    let stats = broker.stats();
    assert_eq!(rec.len(), 1);
    assert_eq!(stats.state, BrokerState::ShutDown);
    assert_eq!(stats.dropped_on_shutdown, 4);
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.subscriptions, 0);
}

/// Тест проверяет прерывание зависшего цикла по истечении grace-периода.
#[tokio::test]
async fn test_shutdown_aborts_stuck_loop() {
    let broker = Broker::new(BrokerConfig::default().with_shutdown_grace(Duration::from_millis(50)));
    let gate = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let completed = Arc::new(AtomicBool::new(false));
    let (g, e, c) = (gate.clone(), entered.clone(), completed.clone());
    broker
        .subscribe(
            "stuck",
            handler_fn(move |_| {
                let (g, e, c) = (g.clone(), e.clone(), c.clone());
                async move {
                    e.notify_one();
                    g.notified().await;
                    c.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();

    for _ in 0..3 {
        broker.publish("stuck", Payload::new()).unwrap();
    }
    broker.start().unwrap();
    entered.notified().await;
    broker.shutdown().await.unwrap();

    let stats = broker.stats();
    assert_eq!(stats.dropped_on_shutdown, 2);
    assert_eq!(stats.state, BrokerState::ShutDown);
    assert_eq!(
        broker.publish("stuck", Payload::new()),
        Err(BrokerError::ShutDown)
    );

    // обработчик прерван вместе с циклом и не продолжит работу
    gate.notify_waiters();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!completed.load(Ordering::SeqCst));
}

/// Тест проверяет идемпотентность повторной подписки.
#[tokio::test]
async fn test_double_subscribe_is_idempotent() {
    let broker = Broker::default();
    let rec = Recorder::default();
    let h = rec.handler();
    broker.subscribe("dup", h.clone()).unwrap();
    broker.subscribe("dup", h.clone()).unwrap();
    broker.subscribe("dup/*", h.clone()).unwrap();
    broker.subscribe("dup/*", h).unwrap();
    assert_eq!(broker.stats().subscriptions, 2);
    broker.start().unwrap();

    broker.publish("dup", Payload::new()).unwrap();
    broker.publish("dup/x", Payload::new()).unwrap();
    wait_until(|| broker.stats().queue_depth == 0 && rec.len() >= 2).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(rec.topics(), vec!["dup", "dup/x"]);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет сценарий с тегами: `tag/set`, `tag/*`, `tag/get`.
#[tokio::test]
async fn test_tag_scenario() {
    let broker = Broker::default();
    let (set, all, get) = (
        Recorder::default(),
        Recorder::default(),
        Recorder::default(),
    );
    broker.subscribe(topics::TAG_SET, set.handler()).unwrap();
    broker.subscribe("tag/*", all.handler()).unwrap();
    broker.subscribe(topics::TAG_GET, get.handler()).unwrap();
    broker.start().unwrap();

    let write = payload_from(json!({ "tag": "motion.x", "value": 1.0 }));
    broker.publish(topics::TAG_SET, write.clone()).unwrap();
    wait_until(|| set.len() == 1 && all.len() == 1).await;

    assert_eq!(set.payloads(), vec![write.clone()]);
    assert_eq!(all.payloads(), vec![write]);
    assert_eq!(get.len(), 0);

    broker
        .publish(topics::TAG_GET, payload_from(json!({ "tag": "motion.x" })))
        .unwrap();
    wait_until(|| all.len() == 2 && get.len() == 1).await;

    assert_eq!(set.len(), 1);
    assert_eq!(all.topics(), vec!["tag/set", "tag/get"]);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет рассылку изменений конфигурации по соглашению
/// `config/update/{type}`.
#[tokio::test]
async fn test_config_update_broadcast() {
    let broker = Broker::default();
    let rec = Recorder::default();
    broker.subscribe("config/update/*", rec.handler()).unwrap();
    broker.start().unwrap();

    broker
        .publish(
            &topics::config_update_topic("plc"),
            payload_from(json!({ "poll_ms": 250 })),
        )
        .unwrap();
    wait_until(|| rec.len() == 1).await;

    assert_eq!(rec.topics(), vec!["config/update/plc"]);
    broker.shutdown().await.unwrap();
}

/// Тест проверяет работу на многопоточном runtime с публикацией из
/// нескольких задач.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers() {
    let broker = Broker::default();
    let rec = Recorder::default();
    broker.subscribe("load/*", rec.handler()).unwrap();
    broker.start().unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|w| {
            let b = broker.clone();
            tokio::spawn(async move {
                for n in 0..25 {
                    b.publish(&format!("load/{w}"), payload_from(json!({ "n": n })))
                        .unwrap();
                }
            })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }
    wait_until(|| rec.len() == 100).await;

    // внутри одного издателя порядок сохраняется
    for w in 0..4 {
        let topic = format!("load/{w}");
        let ns: Vec<i64> = rec
            .seen
            .lock()
            .iter()
            .filter(|e| *e.topic == *topic)
            .map(|e| e.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, (0..25).collect::<Vec<_>>());
    }
    broker.shutdown().await.unwrap();
}

/// Тест проверяет счётчик очереди под нагрузкой с нескольких потоков:
/// после доставки всех сообщений очередь пуста и shutdown ничего не
/// отбрасывает.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_depth_under_concurrent_load() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 5_000;

    let broker = Broker::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    broker
        .subscribe(
            "load",
            handler_fn(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();
    broker.start().unwrap();

    let tasks: Vec<_> = (0..WORKERS)
        .map(|_| {
            let b = broker.clone();
            tokio::spawn(async move {
                for _ in 0..PER_WORKER {
                    b.publish("load", Payload::new()).unwrap();
                }
            })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }

    let total = WORKERS * PER_WORKER;
    tokio::time::timeout(Duration::from_secs(30), async {
        while counter.load(Ordering::SeqCst) < total {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("not all messages were delivered");

    assert_eq!(broker.stats().queue_depth, 0);
    broker.shutdown().await.unwrap();

    let stats = broker.stats();
    assert_eq!(stats.published, total as u64);
    assert_eq!(stats.dropped_on_shutdown, 0);
}

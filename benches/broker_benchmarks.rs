use std::{hint::black_box, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mcs_bus::{handler_fn, payload_from, Broker, Handler, Payload};
use serde_json::json;
use tokio::runtime::Runtime;

fn noop() -> Handler {
    handler_fn(|_| async { Ok(()) })
}

/// Ждём, пока цикл доставки не догонит `target`.
async fn wait_delivered(
    broker: &Broker,
    target: u64,
) {
    while broker.stats().delivered < target {
        tokio::task::yield_now().await;
    }
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let broker = Broker::default();
    let h = noop();
    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            broker.subscribe(black_box("chan"), h.clone()).unwrap();
            black_box(broker.unsubscribe("chan", &h));
        })
    });
}

fn bench_publish_dispatch(c: &mut Criterion) {
    const BATCH: u64 = 100;
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish_dispatch");

    for subs in [1u64, 10, 100] {
        let broker = Broker::default();
        for _ in 0..subs {
            broker.subscribe("chan", noop()).unwrap();
        }
        {
            let _guard = rt.enter();
            broker.start().unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(subs), &subs, |b, &subs| {
            b.to_async(&rt).iter(|| async {
                let target = broker.stats().delivered + BATCH * subs;
                for n in 0..BATCH {
                    broker
                        .publish("chan", payload_from(json!({ "n": n })))
                        .unwrap();
                }
                wait_delivered(&broker, target).await;
            })
        });

        rt.block_on(broker.shutdown()).unwrap();
    }
    group.finish();
}

fn bench_wildcard_recipients(c: &mut Criterion) {
    let broker = Broker::default();
    for i in 0..100 {
        broker.subscribe(&format!("area{i}/*"), noop()).unwrap();
    }
    broker.subscribe("area42/line/3", noop()).unwrap();

    c.bench_function("subscriber_count_100_prefixes", |b| {
        b.iter(|| black_box(broker.subscriber_count(black_box("area42/line/3"))))
    });
}

fn bench_request_reply(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let broker = Broker::default();
    let responder = broker.clone();
    broker
        .subscribe(
            "echo",
            handler_fn(move |env| {
                let responder = responder.clone();
                async move {
                    responder.publish("echo/response", env.into_payload())?;
                    Ok(())
                }
            }),
        )
        .unwrap();
    {
        let _guard = rt.enter();
        broker.start().unwrap();
    }

    c.bench_function("request_reply", |b| {
        b.to_async(&rt).iter(|| async {
            broker
                .request("echo", Payload::new(), Some(Duration::from_secs(1)))
                .await
                .unwrap()
        })
    });

    rt.block_on(broker.shutdown()).unwrap();
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_publish_dispatch,
    bench_wildcard_recipients,
    bench_request_reply,
);
criterion_main!(benches);

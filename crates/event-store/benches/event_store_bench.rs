use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{AggregateIdentifier, AppendOptions, EventStore, InMemoryEventStore};
use message::Message;

fn make_events(aggregate: &AggregateIdentifier, count: usize) -> Vec<Message> {
    let command = Message::command("create", aggregate.clone())
        .build()
        .unwrap();
    (0..count)
        .map(|i| {
            Message::event("created", aggregate.clone())
                .caused_by(&command)
                .data(serde_json::json!({ "index": i }))
                .build()
                .unwrap()
        })
        .collect()
}

fn bench_save_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/save_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let aggregate = AggregateIdentifier::new("bench", "greeting", "default");
                store
                    .save(make_events(&aggregate, 1), AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_save_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/save_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let aggregate = AggregateIdentifier::new("bench", "greeting", "default");
                store
                    .save(make_events(&aggregate, 10), AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_load_100_causations(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let aggregate = AggregateIdentifier::new("bench", "greeting", "default");

    rt.block_on(async {
        let mut loaded: Vec<Message> = Vec::new();
        for _ in 0..100 {
            let saved = store
                .save(make_events(&aggregate, 1), AppendOptions::after(&loaded))
                .await
                .unwrap();
            loaded.extend(saved);
        }
    });

    c.bench_function("event_store/load_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.load(&aggregate).await.unwrap();
                assert_eq!(events.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_single_event,
    bench_save_batch_10,
    bench_load_100_causations
);
criterion_main!(benches);

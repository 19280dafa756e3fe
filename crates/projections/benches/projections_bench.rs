use chrono::{Duration, Utc};
use common::AggregateIdentifier;
use criterion::{Criterion, criterion_group, criterion_main};
use message::Message;
use projections::{InMemoryViewStore, View, ViewQuery, ViewStore, ViewStoreOptions};
use serde_json::json;

fn identifier(id: &str) -> AggregateIdentifier {
    AggregateIdentifier::new(id, "greeting", "default")
}

/// Builds `n` events one millisecond apart, oldest first.
fn events(n: i64) -> Vec<Message> {
    let base = Utc::now();
    (0..n)
        .map(|i| {
            Message::event("updated", identifier("A"))
                .timestamp(base + Duration::milliseconds(i))
                .data(json!({"count": i}))
                .build()
                .unwrap()
        })
        .collect()
}

fn bench_set_state_in_order(c: &mut Criterion) {
    let events = events(100);

    c.bench_function("projections/set_state_100_in_order", |b| {
        b.iter(|| {
            let mut view = View::new(identifier("A")).unwrap();
            for event in &events {
                view.set_state(event, "greeting.count", event.data()["count"].clone())
                    .unwrap();
            }
        });
    });
}

fn bench_set_state_reversed(c: &mut Criterion) {
    let events = events(100);

    c.bench_function("projections/set_state_100_reversed", |b| {
        b.iter(|| {
            let mut view = View::new(identifier("A")).unwrap();
            for event in events.iter().rev() {
                view.set_state(event, "greeting.count", event.data()["count"].clone())
                    .unwrap();
            }
        });
    });
}

fn bench_add_remove_fields(c: &mut Criterion) {
    let events = events(100);

    c.bench_function("projections/add_remove_100_fields", |b| {
        b.iter(|| {
            let mut view = View::new(identifier("A")).unwrap();
            for (i, event) in events.iter().enumerate() {
                view.add_field(event, "tags", json!({"tag": i})).unwrap();
            }
            for (i, event) in events.iter().enumerate().step_by(2) {
                view.remove_field_where_match(event, "tags", &json!({"tag": i}))
                    .unwrap();
            }
        });
    });
}

fn bench_query_100_views(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryViewStore::new();
    let options = ViewStoreOptions::default();

    rt.block_on(async {
        for (i, event) in events(100).iter().enumerate() {
            let mut view = View::new(identifier(&format!("view-{i}"))).unwrap();
            view.set_state(event, "parity", json!(i % 2)).unwrap();
            store.save(&view, event, &options).await.unwrap();
        }
    });

    let query = ViewQuery::new("greeting").state(json!({"parity": 0}));
    c.bench_function("projections/query_100_views_by_state", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.query(&query, &options).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_set_state_in_order,
    bench_set_state_reversed,
    bench_add_remove_fields,
    bench_query_100_views,
);
criterion_main!(benches);

//! Integration tests for the saga domain.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{AggregateIdentifier, AggregateTarget, HandlerIdentifier};
use domain::{Conditions, DomainError, DomainErrorKind, ErrorClass};
use message::{
    BoxError, InMemoryMessageBus, Message, MessageBus, RetryPolicy, Subscription, Topic,
};
use saga::{
    InMemorySagaStore, Saga, SagaContext, SagaDomain, SagaError, SagaEventHandler,
    SagaEventRegistration, SagaSaveOptions, SagaStore, handler_fn,
};
use serde_json::json;

fn greeting() -> HandlerIdentifier {
    HandlerIdentifier::new("greeting", "default")
}

fn log_greeting() -> HandlerIdentifier {
    HandlerIdentifier::new("logGreeting", "default")
}

fn event(name: &str, data: serde_json::Value) -> Message {
    Message::event(name, greeting().with_id("A"))
        .data(data)
        .build()
        .unwrap()
}

/// Test harness wiring a saga domain over in-memory stores.
struct TestHarness {
    store: InMemorySagaStore,
    bus: Arc<InMemoryMessageBus>,
    domain: Arc<SagaDomain<InMemorySagaStore, InMemoryMessageBus>>,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemorySagaStore::new();
        let bus = Arc::new(InMemoryMessageBus::with_retry_policy(RetryPolicy::bounded(
            1,
            Duration::ZERO,
        )));
        let domain = SagaDomain::new(store.clone(), bus.clone());
        Self { store, bus, domain }
    }

    /// Registers the greeting saga: `created` dispatches `update`.
    async fn with_greeting_saga() -> Self {
        let harness = Self::new();
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                greeting(),
                "created",
                log_greeting(),
                handler_fn(|ctx| {
                    let data = ctx.event().data().clone();
                    ctx.merge_state(data)?;
                    let target = ctx.event().aggregate().clone();
                    ctx.dispatch(
                        Message::command("update", target).data(json!({"foo": {"bar": "baz"}})),
                    )
                }),
            ))
            .await
            .unwrap();
        harness
            .domain
            .register_event_handler(
                SagaEventRegistration::new(
                    greeting(),
                    "updated",
                    log_greeting(),
                    handler_fn(|ctx| {
                        let data = ctx.event().data().clone();
                        ctx.merge_state(data)
                    }),
                )
                .conditions(Conditions::created()),
            )
            .await
            .unwrap();
        harness
    }

    async fn stored(&self) -> Option<Saga> {
        self.store
            .load(&log_greeting().with_id("A"))
            .await
            .unwrap()
    }

    async fn published_names(&self) -> Vec<String> {
        self.bus
            .published()
            .await
            .iter()
            .map(|message| message.name().to_string())
            .collect()
    }
}

fn domain_kind(err: &SagaError) -> Option<&DomainErrorKind> {
    match err {
        SagaError::Domain(err) => Some(err.kind()),
        _ => None,
    }
}

/// Subscribes a stand-in for the greeting aggregate: each `update` command
/// is counted and answered with an `updated` event while `healthy` is set.
async fn subscribe_greeting_aggregate(
    harness: &TestHarness,
    healthy: Arc<AtomicBool>,
) -> Arc<AtomicU32> {
    let handled = Arc::new(AtomicU32::new(0));
    let counter = handled.clone();
    let bus = harness.bus.clone();
    harness
        .bus
        .subscribe(Subscription::new(
            Topic::new("update", greeting()),
            greeting(),
            move |command: Message| {
                let bus = bus.clone();
                let healthy = healthy.clone();
                let counter = counter.clone();
                async move {
                    if !healthy.load(Ordering::SeqCst) {
                        return Err::<(), BoxError>("greeting aggregate unavailable".into());
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let updated = Message::event("updated", command.aggregate().clone())
                        .caused_by(&command)
                        .data(command.data().clone())
                        .build()?;
                    bus.publish(vec![updated]).await?;
                    Ok(())
                }
            },
        ))
        .await
        .unwrap();
    handled
}

mod event_handling {
    use super::*;

    #[tokio::test]
    async fn test_created_event_dispatches_update() {
        let harness = TestHarness::with_greeting_saga().await;
        let created = event("created", json!({"hello": "world"}));

        let saga = harness
            .domain
            .handle_event(created.clone(), &log_greeting())
            .await
            .unwrap();

        assert_eq!(saga.state(), &json!({"hello": "world"}));
        assert!(saga.messages_to_dispatch().is_empty());
        assert_eq!(saga.revision(), 2);

        let published = harness.bus.published().await;
        assert_eq!(published.len(), 1);
        let command = &published[0];
        assert!(command.is_command());
        assert_eq!(command.name(), "update");
        assert_eq!(command.aggregate(), &greeting().with_id("A"));
        assert_eq!(command.causation_id(), created.id());
        assert_eq!(command.data(), &json!({"foo": {"bar": "baz"}}));

        let stored = harness.stored().await.unwrap();
        assert_eq!(stored, saga);
        assert_eq!(harness.store.save_attempts().await.len(), 1);
        assert_eq!(harness.store.clear_attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_event_is_handled_once() {
        let harness = TestHarness::with_greeting_saga().await;
        let created = event("created", json!({"hello": "world"}));

        harness
            .domain
            .handle_event(created.clone(), &log_greeting())
            .await
            .unwrap();
        let saga = harness
            .domain
            .handle_event(created, &log_greeting())
            .await
            .unwrap();

        assert_eq!(saga.revision(), 2);
        assert_eq!(harness.store.save_attempts().await.len(), 1);
        assert_eq!(harness.published_names().await, vec!["update"]);
    }

    #[tokio::test]
    async fn test_events_arrive_through_the_bus() {
        let harness = TestHarness::with_greeting_saga().await;

        harness
            .bus
            .publish(vec![event("created", json!({"hello": "world"}))])
            .await
            .unwrap();
        harness
            .bus
            .publish(vec![event("updated", json!({"foo": {"bar": "baz"}}))])
            .await
            .unwrap();

        assert_eq!(
            harness.published_names().await,
            vec!["update", "created", "updated"]
        );
        let stored = harness.stored().await.unwrap();
        assert_eq!(
            stored.state(),
            &json!({"hello": "world", "foo": {"bar": "baz"}})
        );
        assert_eq!(stored.causation_list().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_event_is_fatal() {
        let harness = TestHarness::with_greeting_saga().await;

        let err = harness
            .domain
            .handle_event(event("renamed", json!({})), &log_greeting())
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::HandlerNotRegistered(_)));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_contexts_fan_out() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                AggregateTarget::with_contexts("greeting", ["default", "billing"]),
                "created",
                log_greeting(),
                handler_fn(|ctx| {
                    let context = ctx.event().aggregate().context.clone();
                    ctx.set_state(&format!("seen.{context}"), json!(true))
                }),
            ))
            .await
            .unwrap();

        for context in ["default", "billing"] {
            harness
                .bus
                .publish(vec![
                    Message::event("created", AggregateIdentifier::new("A", "greeting", context))
                        .build()
                        .unwrap(),
                ])
                .await
                .unwrap();
        }

        let stored = harness.stored().await.unwrap();
        assert_eq!(
            stored.state(),
            &json!({"seen": {"default": true, "billing": true}})
        );
        assert_eq!(harness.bus.subscriptions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let harness = TestHarness::with_greeting_saga().await;

        let err = harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                AggregateTarget::with_contexts("greeting", ["billing", "default"]),
                "created",
                log_greeting(),
                handler_fn(|_ctx| Ok(())),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::HandlerAlreadyRegistered(_)));
        assert_eq!(harness.bus.subscriptions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_timeouts_are_addressed_to_the_saga() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                greeting(),
                "created",
                log_greeting(),
                handler_fn(|ctx| ctx.timeout("expired", json!({"attempt": 1}), 1000)),
            ))
            .await
            .unwrap();

        harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap();

        let published = harness.bus.published().await;
        assert_eq!(published.len(), 1);
        assert!(published[0].is_timeout());
        assert_eq!(published[0].delay_ms(), 1000);
        assert_eq!(published[0].aggregate(), &log_greeting().with_id("A"));
    }

    #[tokio::test]
    async fn test_causations_cap_is_applied() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(
                SagaEventRegistration::new(greeting(), "updated", log_greeting(), handler_fn(|_ctx| Ok(())))
                    .save_options(SagaSaveOptions::with_causations_cap(1)),
            )
            .await
            .unwrap();

        let first = event("updated", json!({}));
        let second = event("updated", json!({}));
        for event in [&first, &second] {
            harness
                .domain
                .handle_event(event.clone(), &log_greeting())
                .await
                .unwrap();
        }

        let stored = harness.stored().await.unwrap();
        assert_eq!(stored.causation_list(), &[second.id().to_string()]);
    }
}

mod conditions {
    use super::*;

    #[tokio::test]
    async fn test_created_condition_on_fresh_saga() {
        let harness = TestHarness::with_greeting_saga().await;

        let err = harness
            .domain
            .handle_event(event("updated", json!({})), &log_greeting())
            .await
            .unwrap_err();

        assert_eq!(domain_kind(&err), Some(&DomainErrorKind::SagaNotCreated));
        assert_eq!(err.class(), ErrorClass::Domain { permanent: false });
        assert!(harness.store.save_attempts().await.is_empty());
        assert!(harness.bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_not_created_condition_rejects_permanently_by_default() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(
                SagaEventRegistration::new(
                    greeting(),
                    "created",
                    log_greeting(),
                    handler_fn(|ctx| ctx.set_state("count", json!(1))),
                )
                .conditions(Conditions::not_created()),
            )
            .await
            .unwrap();

        harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap();
        let second = event("created", json!({}));
        let saga = harness
            .domain
            .handle_event(second.clone(), &log_greeting())
            .await
            .unwrap();

        assert!(!saga.has_handled(second.id()));
        assert_eq!(harness.store.save_attempts().await.len(), 1);

        let published = harness.bus.published().await;
        let rejection = published.last().unwrap();
        assert_eq!(rejection.name(), "SagaAlreadyCreatedError");
        assert_eq!(rejection.aggregate(), &log_greeting().with_id("A"));
        assert!(!rejection.mandatory());
        assert_eq!(rejection.id(), format!("{}.SagaAlreadyCreatedError", second.id()));
    }

    #[tokio::test]
    async fn test_not_created_condition_can_be_transient() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(
                SagaEventRegistration::new(greeting(), "created", log_greeting(), handler_fn(|_ctx| Ok(())))
                    .conditions(Conditions::not_created().permanent(false)),
            )
            .await
            .unwrap();

        harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap();
        let err = harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap_err();

        assert_eq!(domain_kind(&err), Some(&DomainErrorKind::SagaAlreadyCreated));
        assert!(!err.class().is_permanent());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_permanent_handler_error_is_absorbed() {
        let harness = TestHarness::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        harness.domain.on_error(move |err, event| {
            sink.lock()
                .unwrap()
                .push(format!("{}:{}", event.name(), err));
        });
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                greeting(),
                "created",
                log_greeting(),
                handler_fn(|ctx| {
                    ctx.merge_state(json!({"touched": true}))?;
                    Err(DomainError::custom("GreetingRejectedError", "greeting refused")
                        .permanent(true)
                        .into())
                }),
            ))
            .await
            .unwrap();

        let saga = harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap();

        assert_eq!(saga.state(), &json!({}));
        assert_eq!(saga.revision(), 0);
        assert!(harness.stored().await.is_none());
        assert_eq!(harness.published_names().await, vec!["GreetingRejectedError"]);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["created:GreetingRejectedError: greeting refused"]
        );
    }

    #[tokio::test]
    async fn test_transient_handler_error_propagates() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                greeting(),
                "created",
                log_greeting(),
                handler_fn(|_ctx| Err(DomainError::custom("NotYetError", "try again").into())),
            ))
            .await
            .unwrap();

        let err = harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Domain { permanent: false });
        assert!(harness.bus.published().await.is_empty());
        assert!(harness.store.save_attempts().await.is_empty());
    }

    /// Handler that saves the saga behind the domain's back.
    struct CompetingWriter {
        store: InMemorySagaStore,
    }

    #[async_trait]
    impl SagaEventHandler for CompetingWriter {
        async fn handle(&self, ctx: &mut SagaContext<'_>) -> saga::Result<()> {
            let competitor = Saga::new(ctx.saga().saga_identifier().clone())?;
            let other = event("created", json!({}));
            self.store
                .save(&competitor, &other, &SagaSaveOptions::default())
                .await?;
            ctx.set_state("winner", json!(false))
        }
    }

    #[tokio::test]
    async fn test_concurrent_write_is_transient() {
        let harness = TestHarness::new();
        harness
            .domain
            .register_event_handler(SagaEventRegistration::new(
                greeting(),
                "created",
                log_greeting(),
                CompetingWriter {
                    store: harness.store.clone(),
                },
            ))
            .await
            .unwrap();

        let err = harness
            .domain
            .handle_event(event("created", json!({})), &log_greeting())
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Concurrency);
        assert_eq!(harness.stored().await.unwrap().revision(), 1);
        assert!(harness.bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_bus_retries_transient_failures() {
        let harness = TestHarness::with_greeting_saga().await;

        let err = harness
            .bus
            .publish(vec![event("updated", json!({}))])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("updated"));
        assert!(harness.bus.published().await.is_empty());
    }
}

mod listeners {
    use super::*;

    #[tokio::test]
    async fn test_success_is_signalled_after_publish() {
        let harness = TestHarness::with_greeting_saga().await;
        let bus = harness.bus.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        harness.domain.on_success(move |event, saga| {
            sink.lock()
                .unwrap()
                .push((event.name().to_string(), saga.revision()));
        });

        harness
            .domain
            .handle_event(event("created", json!({"hello": "world"})), &log_greeting())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("created".to_string(), 2)]);
        assert_eq!(bus.published().await.len(), 1);
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn test_outbox_survives_failed_delivery() {
        let harness = TestHarness::with_greeting_saga().await;
        let healthy = Arc::new(AtomicBool::new(false));
        let handled = subscribe_greeting_aggregate(&harness, healthy.clone()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        harness.domain.on_success(move |event, _saga| {
            sink.lock().unwrap().push(format!("ok:{}", event.name()));
        });
        let sink = seen.clone();
        harness.domain.on_error(move |err, event| {
            sink.lock()
                .unwrap()
                .push(format!("err:{}:{:?}", event.name(), err.class()));
        });

        let created = event("created", json!({"hello": "world"}));
        harness
            .bus
            .publish(vec![created.clone()])
            .await
            .unwrap_err();

        let stored = harness.stored().await.unwrap();
        assert_eq!(stored.causation_list().len(), 1);
        assert_eq!(stored.messages_to_dispatch().len(), 1);
        assert_eq!(stored.messages_to_dispatch()[0].name(), "update");
        assert!(harness.store.clear_attempts().await.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["err:created:Fatal"]);

        healthy.store(true, Ordering::SeqCst);
        harness.bus.publish(vec![created]).await.unwrap();

        let stored = harness.stored().await.unwrap();
        assert!(stored.messages_to_dispatch().is_empty());
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(harness.store.save_attempts().await.len(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["err:created:Fatal", "ok:updated", "ok:created"]
        );
    }

    #[tokio::test]
    async fn test_reacting_to_own_command_publishes_it_once() {
        let harness = TestHarness::with_greeting_saga().await;
        let handled =
            subscribe_greeting_aggregate(&harness, Arc::new(AtomicBool::new(true))).await;

        harness
            .bus
            .publish(vec![event("created", json!({"hello": "world"}))])
            .await
            .unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(
            harness.published_names().await,
            vec!["updated", "update", "created"]
        );

        let stored = harness.stored().await.unwrap();
        assert_eq!(
            stored.state(),
            &json!({"hello": "world", "foo": {"bar": "baz"}})
        );
        assert_eq!(stored.causation_list().len(), 2);
        assert!(stored.messages_to_dispatch().is_empty());
        assert_eq!(stored.revision(), 3);
    }

    #[tokio::test]
    async fn test_failure_below_nested_handling_keeps_outbox() {
        let harness = TestHarness::with_greeting_saga().await;
        subscribe_greeting_aggregate(&harness, Arc::new(AtomicBool::new(true))).await;
        harness
            .bus
            .subscribe(Subscription::new(
                Topic::new("updated", greeting()),
                HandlerIdentifier::new("greetingReport", "default"),
                |_event| async { Err::<(), BoxError>("report unavailable".into()) },
            ))
            .await
            .unwrap();

        harness
            .bus
            .publish(vec![event("created", json!({"hello": "world"}))])
            .await
            .unwrap_err();

        let stored = harness.stored().await.unwrap();
        assert_eq!(stored.causation_list().len(), 2);
        assert_eq!(stored.messages_to_dispatch().len(), 1);
        assert_eq!(stored.messages_to_dispatch()[0].name(), "update");
        assert!(harness.published_names().await.is_empty());
    }
}

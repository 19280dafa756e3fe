//! The bundled greeting domain.
//!
//! - aggregate `greeting`: `create` applies `created`, `update` applies `updated`
//! - saga `logGreeting`: records greetings and answers `created` with an `update`
//! - view `greeting`: keeps the latest created and updated payloads

use common::HandlerIdentifier;
use domain::{
    AggregateCommandRegistration, AggregateEventRegistration, Conditions, FieldType, ObjectSchema,
    command_handler_fn, event_handler_fn,
};
use message::Message;
use projections::{ViewEventRegistration, view_handler_fn};
use saga::{SagaEventRegistration, handler_fn};
use serde_json::json;

use crate::app::App;
use crate::error::Result;

pub const AGGREGATE: &str = "greeting";
pub const SAGA: &str = "logGreeting";
pub const VIEW: &str = "greeting";

/// Identifiers left without a context pick up the configured one.
fn unscoped(name: &str) -> HandlerIdentifier {
    HandlerIdentifier::new(name, "")
}

/// Registers the greeting aggregate, saga and view on `app`.
pub async fn register(app: &App) -> Result<()> {
    register_aggregate(app).await?;
    register_saga(app).await?;
    register_view(app).await?;

    tracing::info!("greeting domain registered");
    Ok(())
}

async fn register_aggregate(app: &App) -> Result<()> {
    app.register_command_handler(
        AggregateCommandRegistration::new(
            unscoped(AGGREGATE),
            "create",
            command_handler_fn(|ctx| {
                let data = ctx.command().data().clone();
                ctx.apply("created", data)
            }),
        )
        .conditions(Conditions::not_created())
        .schema(ObjectSchema::new().required("hello", FieldType::String)),
    )
    .await?;

    app.register_command_handler(
        AggregateCommandRegistration::new(
            unscoped(AGGREGATE),
            "update",
            command_handler_fn(|ctx| {
                let data = ctx.command().data().clone();
                ctx.apply("updated", data)
            }),
        )
        .conditions(Conditions::created()),
    )
    .await?;

    for event in ["created", "updated"] {
        app.register_aggregate_event_handler(AggregateEventRegistration::new(
            unscoped(AGGREGATE),
            event,
            event_handler_fn(|ctx| {
                let data = ctx.event().data().clone();
                ctx.merge_state(data)
            }),
        ))
        .await?;
    }
    Ok(())
}

async fn register_saga(app: &App) -> Result<()> {
    app.register_saga_handler(SagaEventRegistration::new(
        unscoped(AGGREGATE),
        "created",
        unscoped(SAGA),
        handler_fn(|ctx| {
            let data = ctx.event().data().clone();
            ctx.merge_state(data)?;

            let greeting = ctx.event().aggregate().clone();
            ctx.dispatch(Message::command("update", greeting).data(json!({"logged": true})))
        }),
    ))
    .await?;

    app.register_saga_handler(
        SagaEventRegistration::new(
            unscoped(AGGREGATE),
            "updated",
            unscoped(SAGA),
            handler_fn(|ctx| {
                let data = ctx.event().data().clone();
                ctx.merge_state(data)
            }),
        )
        .conditions(Conditions::created()),
    )
    .await?;
    Ok(())
}

async fn register_view(app: &App) -> Result<()> {
    app.register_view_handler(ViewEventRegistration::new(
        unscoped(AGGREGATE),
        "created",
        unscoped(VIEW),
        view_handler_fn(|ctx| {
            let data = ctx.event().data().clone();
            ctx.set_state("path1.path2", data)
        }),
    ))
    .await?;

    app.register_view_handler(ViewEventRegistration::new(
        unscoped(AGGREGATE),
        "updated",
        unscoped(VIEW),
        view_handler_fn(|ctx| {
            let data = ctx.event().data().clone();
            ctx.set_state("path3.path4", data)
        }),
    ))
    .await?;
    Ok(())
}

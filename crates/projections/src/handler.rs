//! View event handlers and their registrations.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateTarget, HandlerIdentifier};
use domain::Conditions;
use message::Message;
use serde_json::Value;

use crate::error::Result;
use crate::store::ViewStoreOptions;
use crate::view::View;

/// Derives the view instance id from an incoming event.
pub type ViewIdFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Projects one event into a view.
#[async_trait]
pub trait ViewEventHandler: Send + Sync {
    async fn handle(&self, ctx: &mut ViewContext<'_>) -> Result<()>;
}

/// Closure-backed [`ViewEventHandler`] for handlers that do not await.
pub struct ViewHandlerFn<F>(F);

#[async_trait]
impl<F> ViewEventHandler for ViewHandlerFn<F>
where
    F: Fn(&mut ViewContext<'_>) -> Result<()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ViewContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Wraps a synchronous closure as a view event handler.
pub fn view_handler_fn<F>(f: F) -> ViewHandlerFn<F>
where
    F: Fn(&mut ViewContext<'_>) -> Result<()> + Send + Sync,
{
    ViewHandlerFn(f)
}

/// Handle given to view event handlers.
///
/// Every write is stamped with the timestamp of the event being handled.
pub struct ViewContext<'a> {
    event: &'a Message,
    state: Value,
    view: &'a mut View,
}

impl<'a> ViewContext<'a> {
    pub(crate) fn new(event: &'a Message, view: &'a mut View) -> Self {
        Self {
            event,
            state: view.state().clone(),
            view,
        }
    }

    pub fn event(&self) -> &Message {
        self.event
    }

    /// View state as it was when the handler started.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn view(&self) -> &View {
        self.view
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.view.destroy()
    }

    pub fn set_state(&mut self, path: &str, value: Value) -> Result<()> {
        self.view.set_state(self.event, path, value)
    }

    pub fn add_field(&mut self, path: &str, value: Value) -> Result<()> {
        self.view.add_field(self.event, path, value)
    }

    pub fn remove_field_where_equal(&mut self, path: &str, value: &Value) -> Result<()> {
        self.view.remove_field_where_equal(self.event, path, value)
    }

    pub fn remove_field_where_match(&mut self, path: &str, pattern: &Value) -> Result<()> {
        self.view.remove_field_where_match(self.event, path, pattern)
    }
}

/// A view event handler bound to an event of an aggregate kind.
///
/// The target may list several contexts; registration fans out to one
/// handler and one subscription per context.
#[derive(Clone)]
pub struct ViewEventRegistration {
    pub aggregate: AggregateTarget,
    pub event: String,
    pub view: HandlerIdentifier,
    pub conditions: Conditions,
    pub get_view_id: ViewIdFn,
    pub handler: Arc<dyn ViewEventHandler>,
    pub load_options: ViewStoreOptions,
    pub save_options: ViewStoreOptions,
}

impl ViewEventRegistration {
    /// Creates a registration keyed on the event's aggregate id.
    pub fn new(
        aggregate: impl Into<AggregateTarget>,
        event: impl Into<String>,
        view: HandlerIdentifier,
        handler: impl ViewEventHandler + 'static,
    ) -> Self {
        Self {
            aggregate: aggregate.into(),
            event: event.into(),
            view,
            conditions: Conditions::none(),
            get_view_id: Arc::new(|event: &Message| event.aggregate().id.clone()),
            handler: Arc::new(handler),
            load_options: ViewStoreOptions::default(),
            save_options: ViewStoreOptions::default(),
        }
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Uses `options` for both loading and saving the view.
    pub fn store_options(self, options: ViewStoreOptions) -> Self {
        self.load_options(options.clone()).save_options(options)
    }

    pub fn load_options(mut self, options: ViewStoreOptions) -> Self {
        self.load_options = options;
        self
    }

    pub fn save_options(mut self, options: ViewStoreOptions) -> Self {
        self.save_options = options;
        self
    }

    /// Overrides how the view id is derived from an event.
    pub fn view_id_from<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> String + Send + Sync + 'static,
    {
        self.get_view_id = Arc::new(f);
        self
    }

    pub(crate) fn expand(&self) -> Vec<ViewHandler> {
        self.aggregate
            .handlers()
            .map(|aggregate| ViewHandler {
                aggregate,
                event: self.event.clone(),
                view: self.view.clone(),
                conditions: self.conditions,
                get_view_id: self.get_view_id.clone(),
                handler: self.handler.clone(),
                load_options: self.load_options.clone(),
                save_options: self.save_options.clone(),
            })
            .collect()
    }
}

#[derive(Clone)]
pub(crate) struct ViewHandler {
    pub aggregate: HandlerIdentifier,
    pub event: String,
    pub view: HandlerIdentifier,
    pub conditions: Conditions,
    pub get_view_id: ViewIdFn,
    pub handler: Arc<dyn ViewEventHandler>,
    pub load_options: ViewStoreOptions,
    pub save_options: ViewStoreOptions,
}

impl ViewHandler {
    pub fn key(&self) -> String {
        handler_key(&self.aggregate, &self.event, &self.view)
    }
}

/// Returns `"{aggregate context}.{aggregate}.{event}:{view context}.{view}"`.
pub(crate) fn handler_key(aggregate: &HandlerIdentifier, event: &str, view: &HandlerIdentifier) -> String {
    format!("{aggregate}.{event}:{view}")
}

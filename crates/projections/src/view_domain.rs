//! Orchestrates event handling for views.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use common::{AggregateIdentifier, HandlerIdentifier};
use domain::{Conditions, DomainError, Listeners, rejection};
use message::{BoxError, Message, MessageBus, Subscription, Topic};
use tokio::sync::RwLock;

use crate::error::{Result, ViewError};
use crate::handler::{ViewContext, ViewEventRegistration, ViewHandler, handler_key};
use crate::store::{ViewQuery, ViewStore, ViewStoreOptions};
use crate::view::View;

/// Routes events to view handlers and persists the projected views.
pub struct ViewDomain<S, B> {
    store: S,
    bus: Arc<B>,
    handlers: RwLock<HashMap<String, ViewHandler>>,
    listeners: Listeners<View, ViewError>,
}

impl<S, B> ViewDomain<S, B>
where
    S: ViewStore + 'static,
    B: MessageBus + 'static,
{
    pub fn new(store: S, bus: Arc<B>) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            handlers: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a handler for every context of its aggregate target and
    /// subscribes each one to the bus.
    pub async fn register_event_handler(
        self: &Arc<Self>,
        registration: ViewEventRegistration,
    ) -> Result<()> {
        let expanded = registration.expand();

        {
            let mut handlers = self.handlers.write().await;
            if let Some(existing) = expanded
                .iter()
                .map(ViewHandler::key)
                .find(|key| handlers.contains_key(key))
            {
                return Err(ViewError::HandlerAlreadyRegistered(existing));
            }
            for handler in &expanded {
                handlers.insert(handler.key(), handler.clone());
            }
        }

        for handler in expanded {
            let topic = Topic::new(handler.event.clone(), handler.aggregate.clone());
            let view = handler.view.clone();
            let domain: Weak<Self> = Arc::downgrade(self);

            self.bus
                .subscribe(Subscription::new(topic, view.clone(), move |event| {
                    let domain = domain.clone();
                    let view = view.clone();
                    async move {
                        let Some(domain) = domain.upgrade() else {
                            return Ok(());
                        };
                        domain
                            .handle_event(event, &view)
                            .await
                            .map(|_| ())
                            .map_err(BoxError::from)
                    }
                }))
                .await?;

            tracing::debug!(key = %handler.key(), "view event handler registered");
        }

        Ok(())
    }

    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&Message, &View) + Send + Sync + 'static,
    {
        self.listeners.on_success(callback);
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&ViewError, &Message) + Send + Sync + 'static,
    {
        self.listeners.on_error(callback);
    }

    /// Returns the stored views matching `query`.
    ///
    /// Reads from the collection the view's handlers load from, or the
    /// default collection when no handler is registered for it.
    pub async fn query(&self, query: &ViewQuery) -> Result<Vec<View>> {
        let options = self
            .handlers
            .read()
            .await
            .values()
            .find(|handler| {
                handler.view.name == query.name
                    && query
                        .context
                        .as_ref()
                        .is_none_or(|context| &handler.view.context == context)
            })
            .map(|handler| handler.load_options.clone())
            .unwrap_or_default();

        self.store.query(query, &options).await
    }

    /// Handles one event for the view kind `view`.
    ///
    /// An event the view already recorded is skipped without notifying
    /// listeners. Permanent domain errors are absorbed: the view is left as stored and
    /// a rejection event addressed to it is published.
    #[tracing::instrument(
        skip(self, event, view),
        fields(event = %event.name(), event_id = %event.id(), view = %view)
    )]
    pub async fn handle_event(&self, event: Message, view: &HandlerIdentifier) -> Result<View> {
        metrics::counter!("view_events_total", "view" => view.name.clone()).increment(1);

        let key = handler_key(&event.aggregate().handler(), event.name(), view);
        let registered = self.handlers.read().await.get(&key).cloned();
        let handler = match registered {
            Some(handler) => handler,
            None => return Err(self.fail(ViewError::HandlerNotRegistered(key), &event)),
        };

        let identifier = view.with_id((handler.get_view_id)(&event));
        let loaded = match self.load(identifier, &handler.load_options).await {
            Ok(loaded) => loaded,
            Err(err) => return Err(self.fail(err, &event)),
        };

        if loaded.has_handled(event.id()) {
            tracing::info!("event already handled");
            return Ok(loaded);
        }

        let untouched = loaded.clone();
        match self.run_handler(loaded, &event, &handler).await {
            Ok(saved) => {
                tracing::debug!(revision = saved.revision(), "view saved");
                self.listeners.emit_success(&event, &saved);
                Ok(saved)
            }
            Err(ViewError::Domain(err)) if err.is_permanent() => {
                self.reject_event(untouched, &event, err).await
            }
            Err(err) => Err(self.fail(err, &event)),
        }
    }

    async fn load(&self, identifier: AggregateIdentifier, options: &ViewStoreOptions) -> Result<View> {
        match self.store.load(&identifier, options).await? {
            Some(view) => Ok(view),
            None => View::new(identifier),
        }
    }

    async fn run_handler(&self, mut view: View, event: &Message, handler: &ViewHandler) -> Result<View> {
        check_conditions(&view, &handler.conditions)?;

        let mut ctx = ViewContext::new(event, &mut view);
        handler.handler.handle(&mut ctx).await?;

        self.store.save(&view, event, &handler.save_options).await
    }

    async fn reject_event(&self, untouched: View, event: &Message, err: DomainError) -> Result<View> {
        metrics::counter!("view_events_rejected_total", "error" => err.name().to_string())
            .increment(1);

        let message = match rejection(event, &err, untouched.view_identifier().clone(), false) {
            Ok(message) => message,
            Err(build) => return Err(self.fail(build.into(), event)),
        };

        let err = ViewError::Domain(err);
        err.class().log(&err, "handling view event");
        self.listeners.emit_error(&err, event);

        if let Err(publish) = self.bus.publish(vec![message]).await {
            let publish = ViewError::from(publish);
            publish.class().log(&publish, "publishing view rejection");
            return Err(publish);
        }
        Ok(untouched)
    }

    fn fail(&self, err: ViewError, event: &Message) -> ViewError {
        err.class().log(&err, "handling view event");
        self.listeners.emit_error(&err, event);
        err
    }
}

fn check_conditions(view: &View, conditions: &Conditions) -> Result<()> {
    if view.destroyed() {
        return Err(DomainError::view_destroyed().into());
    }

    match conditions.created {
        Some(true) if view.revision() < 1 => {
            Err(DomainError::view_not_created(conditions.permanent == Some(true)).into())
        }
        Some(false) if view.revision() > 0 => {
            Err(DomainError::view_already_created(conditions.permanent != Some(false)).into())
        }
        _ => Ok(()),
    }
}

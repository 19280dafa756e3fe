use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::HandlerIdentifier;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{Message, Result};

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Callback = Arc<dyn Fn(Message) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Routing key of a subscription.
///
/// A message matches when its name, aggregate name and aggregate context
/// all equal the topic's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub aggregate: HandlerIdentifier,
}

impl Topic {
    pub fn new(name: impl Into<String>, aggregate: HandlerIdentifier) -> Self {
        Self {
            name: name.into(),
            aggregate,
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.name == message.name()
            && self.aggregate.name == message.aggregate().name
            && self.aggregate.context == message.aggregate().context
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.aggregate, self.name)
    }
}

/// A callback bound to a topic.
///
/// `subscriber` names the handler kind that owns the callback and is used
/// for logging and delivery errors.
#[derive(Clone)]
pub struct Subscription {
    pub topic: Topic,
    pub subscriber: HandlerIdentifier,
    callback: Callback,
}

impl Subscription {
    pub fn new<F, Fut>(topic: Topic, subscriber: HandlerIdentifier, handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        let callback: Callback = Arc::new(
            move |message: Message| -> BoxFuture<'static, std::result::Result<(), BoxError>> {
                Box::pin(handler(message))
            },
        );
        Self {
            topic,
            subscriber,
            callback,
        }
    }

    /// Invokes the callback once.
    pub async fn deliver(&self, message: Message) -> std::result::Result<(), BoxError> {
        (self.callback)(message).await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

/// How a bus redelivers to a failing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn indefinite(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
        }
    }

    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            delay,
        }
    }

    /// Returns true once `attempts` deliveries have been made and no more are allowed.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::indefinite(Duration::from_millis(1000))
    }
}

/// Publish/subscribe transport.
///
/// `publish` resolves only after every matching subscriber has accepted
/// each message, including messages those subscribers published in turn.
/// Failing subscribers are redelivered rather than dropped.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Delivers each message to every subscription whose topic matches it.
    async fn publish(&self, messages: Vec<Message>) -> Result<()>;

    /// Registers a subscription.
    async fn subscribe(&self, subscription: Subscription) -> Result<()>;
}

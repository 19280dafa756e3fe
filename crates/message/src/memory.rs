use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bus::{MessageBus, RetryPolicy, Subscription};
use crate::{BusError, Message, Result};

/// In-process message bus.
///
/// Delivery is sequential: each matching subscriber is awaited in turn
/// (after the message's delay) before the next one, and a message is
/// recorded in [`published`](InMemoryMessageBus::published) once all of
/// them have accepted it.
///
/// Subscribers may publish re-entrantly. A nested publish is delivered
/// inline, so the subscriber that issued it sees its delivery failures and
/// the outer message is only recorded after everything it caused.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    published: Arc<RwLock<Vec<Message>>>,
    retry: RetryPolicy,
}

impl InMemoryMessageBus {
    /// Creates a bus that retries failing subscribers indefinitely.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Returns every message published so far, in completion order.
    pub async fn published(&self) -> Vec<Message> {
        self.published.read().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.clone()
    }

    /// Drops all subscriptions and the published log.
    pub async fn clear(&self) {
        self.subscriptions.write().await.clear();
        self.published.write().await.clear();
    }

    async fn dispatch(&self, message: Message) -> Result<()> {
        let matching: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|subscription| subscription.topic.matches(&message))
            .cloned()
            .collect();

        tracing::debug!(
            message_id = %message.id(),
            name = %message.name(),
            aggregate = %message.aggregate(),
            subscribers = matching.len(),
            "publishing message"
        );

        for subscription in &matching {
            self.deliver(&message, subscription).await?;
        }

        metrics::counter!(
            "bus_messages_published_total",
            "type" => message.message_type().as_str()
        )
        .increment(1);
        self.published.write().await.push(message);
        Ok(())
    }

    async fn deliver(&self, message: &Message, subscription: &Subscription) -> Result<()> {
        if message.delay_ms() > 0 {
            tokio::time::sleep(message.delay()).await;
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let Err(source) = subscription.deliver(message.clone()).await else {
                return Ok(());
            };

            if self.retry.exhausted(attempts) {
                tracing::error!(
                    message_id = %message.id(),
                    name = %message.name(),
                    subscriber = %subscription.subscriber,
                    attempts,
                    error = %source,
                    "delivery failed, giving up"
                );
                return Err(BusError::DeliveryFailed {
                    message_id: message.id().to_string(),
                    name: message.name().to_string(),
                    subscriber: subscription.subscriber.to_string(),
                    attempts,
                    source,
                });
            }

            tracing::warn!(
                message_id = %message.id(),
                subscriber = %subscription.subscriber,
                attempt = attempts,
                error = %source,
                "delivery failed, retrying"
            );
            metrics::counter!("bus_delivery_retries_total").increment(1);
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    #[tracing::instrument(skip(self, messages), fields(count = messages.len()))]
    async fn publish(&self, messages: Vec<Message>) -> Result<()> {
        for message in messages {
            self.dispatch(message).await?;
        }
        Ok(())
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        tracing::debug!(
            topic = %subscription.topic,
            subscriber = %subscription.subscriber,
            "subscribing"
        );
        self.subscriptions.write().await.push(subscription);
        Ok(())
    }
}

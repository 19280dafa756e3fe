//! Typed success/error callbacks owned by an orchestrator.

use std::sync::{Arc, PoisonError, RwLock};

use message::Message;

type SuccessCallback<T> = Arc<dyn Fn(&Message, &T) + Send + Sync>;
type ErrorCallback<E> = Arc<dyn Fn(&E, &Message) + Send + Sync>;

/// Callbacks notified after every handling attempt.
///
/// Success callbacks receive the handled message and the resulting entity;
/// error callbacks receive the failure and the message.
pub struct Listeners<T, E> {
    success: RwLock<Vec<SuccessCallback<T>>>,
    error: RwLock<Vec<ErrorCallback<E>>>,
}

impl<T, E> Default for Listeners<T, E> {
    fn default() -> Self {
        Self {
            success: RwLock::new(Vec::new()),
            error: RwLock::new(Vec::new()),
        }
    }
}

impl<T, E> Listeners<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&Message, &T) + Send + Sync + 'static,
    {
        self.success
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&E, &Message) + Send + Sync + 'static,
    {
        self.error
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn emit_success(&self, message: &Message, entity: &T) {
        let callbacks = self
            .success
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(message, entity);
        }
    }

    pub fn emit_error(&self, error: &E, message: &Message) {
        let callbacks = self
            .error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(error, message);
        }
    }
}

//! Fire-and-forget publish/subscribe bus.
//!
//! Each subscriber gets its own unbounded channel drained by its own task,
//! so publishing is a non-blocking send and a slow or panicking handler
//! only ever backs up its own channel. Subscribers whose task has exited
//! are pruned on the next publish.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use super::CallEvent;

/// Handler invoked for every published event. Handlers run independently
/// of each other and of the publisher.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    async fn on_event(&self, event: CallEvent);
}

pub struct EventBus {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<CallEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler. Spawns one forwarding task that feeds the
    /// handler from its own channel for as long as the bus holds the
    /// sending half.
    pub async fn subscribe(&self, handler: Arc<dyn CallEventHandler>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<CallEvent>();
        self.subscribers.write().await.push(tx);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_event(event).await;
            }
        });
    }

    /// Fan an event out to every live subscriber. Never blocks on
    /// subscriber progress; dead subscribers are dropped here.
    pub async fn publish(&self, event: CallEvent) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stock subscriber that writes every event through `tracing`.
pub struct EventLogger;

#[async_trait]
impl CallEventHandler for EventLogger {
    async fn on_event(&self, event: CallEvent) {
        match &event {
            CallEvent::CallStarted { call_id, state } => {
                info!("Call {} started at state '{}'", call_id, state);
            }
            CallEvent::Transitioned { call_id, from, to } => {
                info!("Call {} transitioned '{}' -> '{}'", call_id, from, to);
            }
            CallEvent::TransitionError {
                call_id,
                state,
                error,
            } => {
                warn!("Call {} recovered at state '{}': {}", call_id, state, error);
            }
            CallEvent::CallCompleted {
                call_id,
                terminal_state,
            } => {
                info!("Call {} completed at state '{}'", call_id, terminal_state);
            }
        }
    }
}

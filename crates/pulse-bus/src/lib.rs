pub mod memory;
pub mod mqtt;
pub mod topic;

mod registry;

use async_trait::async_trait;
use pulse_core::error::BusError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use memory::MemoryBus;
pub use mqtt::MqttBus;

/// One inbound message as delivered to subscription handlers.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Handler = Arc<dyn Fn(BusMessage) -> HandlerFuture + Send + Sync>;

/// Identifies one registered handler for selective removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

impl HandlerToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Wraps an async closure into the boxed handler shape the bus stores.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |message| -> HandlerFuture { Box::pin(f(message)) })
}

/// Publish/subscribe transport between the two services.
///
/// Delivery is at-most-once per connected subscriber; `publish` resolves on
/// transport handoff, not delivery. Every handler registered on a filter
/// matching a topic fires independently, so a message can reach the same
/// subscriber more than once when filters overlap.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Registers `handler` under `filter`. The filter may end in a single
    /// trailing `#` segment matching any suffix. Registered filters survive
    /// reconnects: they are re-subscribed before the connection is ready.
    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<HandlerToken, BusError>;

    /// Drops every handler on `filter` and unsubscribes at the transport.
    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError>;

    /// Drops one handler; removing the last one unsubscribes at the
    /// transport.
    async fn unsubscribe_handler(
        &self,
        filter: &str,
        token: HandlerToken,
    ) -> Result<(), BusError>;
}

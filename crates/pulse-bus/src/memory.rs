use crate::registry::Registry;
use crate::{BusMessage, Handler, HandlerToken, MessageBus, topic};
use async_trait::async_trait;
use pulse_core::error::BusError;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process bus with the same routing semantics as the MQTT transport.
///
/// Used by tests and single-process deployments where both logical services
/// share one runtime. Handlers run to completion before `publish` resolves.
#[derive(Clone, Default)]
pub struct MemoryBus {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let handlers = self.registry.lock().await.matching(topic);
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        for handler in handlers {
            handler(message.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<HandlerToken, BusError> {
        topic::validate_filter(filter)?;
        let (token, _) = self.registry.lock().await.add(filter, handler);
        Ok(token)
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError> {
        self.registry.lock().await.remove_filter(filter);
        Ok(())
    }

    async fn unsubscribe_handler(
        &self,
        filter: &str,
        token: HandlerToken,
    ) -> Result<(), BusError> {
        self.registry.lock().await.remove_handler(filter, token);
        Ok(())
    }
}

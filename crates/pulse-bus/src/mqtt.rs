use crate::registry::{Registry, Removal};
use crate::{BusMessage, Handler, HandlerToken, MessageBus, topic};
use async_trait::async_trait;
use pulse_core::config::MqttConfig;
use pulse_core::error::BusError;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// MQTT-backed transport. One connection per process; the driver task polls
/// the event loop, dispatches inbound publishes to registered handlers and
/// re-subscribes every known filter after a reconnect.
pub struct MqttBus {
    client: AsyncClient,
    registry: Arc<Mutex<Registry>>,
    connected: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl MqttBus {
    /// Spawns the connection driver. Errors while connecting are logged and
    /// retried on the configured reconnect period, never fatal.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 50);
        let registry: Arc<Mutex<Registry>> = Arc::default();
        let connected = Arc::new(AtomicBool::new(false));
        let reconnect = Duration::from_secs(config.reconnect_secs.max(1));

        let driver = {
            let client = client.clone();
            let registry = registry.clone();
            let connected = connected.clone();
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("connected to mqtt broker");
                            let filters = registry.lock().await.filters();
                            for filter in filters {
                                if let Err(err) =
                                    client.subscribe(&filter, QoS::AtMostOnce).await
                                {
                                    warn!("resubscribe failed for '{filter}': {err}");
                                }
                            }
                            connected.store(true, Ordering::SeqCst);
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let handlers = registry.lock().await.matching(&publish.topic);
                            let message = BusMessage {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                            };
                            for handler in handlers {
                                handler(message.clone()).await;
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            connected.store(false, Ordering::SeqCst);
                            warn!("mqtt poll error: {err} (reconnecting)");
                            tokio::time::sleep(reconnect).await;
                        }
                    }
                }
            })
        };

        Self {
            client,
            registry,
            connected,
            driver,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tears the connection down. Part of process shutdown, not of normal
    /// operation.
    pub async fn shutdown(self) {
        if let Err(err) = self.client.disconnect().await {
            warn!("mqtt disconnect failed: {err}");
        }
        self.driver.abort();
        info!("disconnected from mqtt broker");
    }

    async fn transport_unsubscribe(&self, filter: &str) -> Result<(), BusError> {
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|err| BusError::Unsubscribe {
                filter: filter.to_string(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|err| BusError::Publish {
                topic: topic.to_string(),
                message: err.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str, handler: Handler) -> Result<HandlerToken, BusError> {
        topic::validate_filter(filter)?;
        let (token, first) = self.registry.lock().await.add(filter, handler);
        // The registration is kept either way; a failed transport subscribe
        // is retried wholesale on the next ConnAck.
        if first {
            match self.client.subscribe(filter, QoS::AtMostOnce).await {
                Ok(()) => info!("subscribed to topic: {filter}"),
                Err(err) => warn!("subscribe failed for '{filter}': {err}"),
            }
        }
        Ok(token)
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BusError> {
        let removed = self.registry.lock().await.remove_filter(filter);
        if removed {
            self.transport_unsubscribe(filter).await?;
        }
        Ok(())
    }

    async fn unsubscribe_handler(
        &self,
        filter: &str,
        token: HandlerToken,
    ) -> Result<(), BusError> {
        let removal = self.registry.lock().await.remove_handler(filter, token);
        if removal == Removal::RemovedLast {
            self.transport_unsubscribe(filter).await?;
        }
        Ok(())
    }
}

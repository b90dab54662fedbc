use chrono::Utc;
use pulse_bus::{BusMessage, Handler, MessageBus, handler, topic};
use pulse_core::error::BusError;
use pulse_core::types::{Event, EventType, StoredEvent};
use pulse_db::{Collection, Condition, DocumentStore};
use serde_json::Value;
use tracing::{error, info};

pub const EVENTS_COLLECTION: &str = "events";

/// Consumer-side entry point: captures every event the producer publishes
/// and persists it with a receipt timestamp.
///
/// Ingestion is at-most-once and best-effort: malformed payloads are dropped,
/// storage failures are swallowed, and the overlapping wildcard/exact
/// subscriptions mean a single event may be stored twice. Duplicates are
/// accepted, not deduplicated.
pub struct EventIngestor {
    events: Collection,
}

impl EventIngestor {
    /// Subscribes to `<producer>/events/<TYPE>` for every known type plus
    /// the `<producer>/events/#` wildcard, so an event published on a topic
    /// the consumer does not know individually is still captured.
    pub async fn start(
        bus: &dyn MessageBus,
        producer: &str,
        store: &DocumentStore,
    ) -> Result<Self, BusError> {
        let events = store.collection(EVENTS_COLLECTION);

        for event_type in EventType::ALL {
            let exact = topic::event_topic(producer, event_type);
            bus.subscribe(&exact, Self::event_handler(events.clone()))
                .await?;
            info!("subscribed to topic: {exact}");
        }

        let wildcard = topic::wildcard_topic(producer);
        bus.subscribe(&wildcard, Self::event_handler(events.clone()))
            .await?;
        info!("event subscriptions initialized");

        Ok(Self { events })
    }

    fn event_handler(events: Collection) -> Handler {
        handler(move |message: BusMessage| {
            let events = events.clone();
            async move {
                let event: Event = match serde_json::from_slice(&message.payload) {
                    Ok(event) => event,
                    Err(err) => {
                        error!(
                            "error parsing event message on '{}': {err}",
                            message.topic
                        );
                        return;
                    }
                };
                let stored = StoredEvent {
                    event,
                    received_at: Utc::now(),
                };
                let doc = match serde_json::to_value(&stored) {
                    Ok(doc) => doc,
                    Err(err) => {
                        error!("failed to encode stored event: {err}");
                        return;
                    }
                };
                match events.insert_one(&doc).await {
                    Ok(()) => info!(
                        "event stored: {} ({})",
                        stored.event.event_type, stored.event.id
                    ),
                    Err(err) => error!("failed to store event: {err}"),
                }
            }
        })
    }

    /// Point lookup. Absent events and failed lookups both read as `None`;
    /// this surface never raises.
    pub async fn event_by_id(&self, id: &str) -> Option<Event> {
        let conditions = [Condition::Eq("id".to_string(), Value::String(id.to_string()))];
        match self.events.find_one(&conditions).await {
            Ok(Some(doc)) => match serde_json::from_value::<StoredEvent>(doc) {
                Ok(stored) => Some(stored.event),
                Err(err) => {
                    error!("failed to decode stored event {id}: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                error!("failed to get event by id {id}: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEmitter;
    use pulse_bus::MemoryBus;
    use pulse_core::types::EventDraft;
    use pulse_db::{BlobCache, DbHandle, SeriesStore};
    use std::sync::Arc;

    struct Pipeline {
        bus: Arc<MemoryBus>,
        emitter: EventEmitter,
        ingestor: EventIngestor,
        store: DocumentStore,
    }

    async fn pipeline() -> Pipeline {
        let handle = DbHandle::in_memory().unwrap();
        let bus = Arc::new(MemoryBus::new());
        let store = DocumentStore::new(handle.clone());
        let ingestor = EventIngestor::start(bus.as_ref(), "service-a", &store)
            .await
            .unwrap();
        let emitter = EventEmitter::new(
            "service-a",
            bus.clone(),
            SeriesStore::new(handle.clone()),
            BlobCache::new(handle),
        );
        Pipeline {
            bus,
            emitter,
            ingestor,
            store,
        }
    }

    #[tokio::test]
    async fn test_emitted_event_is_stored_with_received_at() {
        let pipeline = pipeline().await;
        let event = pipeline.emitter.record(EventDraft::default()).await.unwrap();

        let docs = pipeline
            .store
            .collection(EVENTS_COLLECTION)
            .find(&[], &pulse_db::FindOptions::default())
            .await
            .unwrap();
        assert!(!docs.is_empty());
        assert_eq!(docs[0]["id"], serde_json::json!(event.id));
        assert!(docs[0]["receivedAt"].is_string());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_accepted_not_deduplicated() {
        let pipeline = pipeline().await;
        pipeline.emitter.record(EventDraft::default()).await.unwrap();

        // Exact and wildcard subscriptions both fire for one publish.
        let count = pipeline
            .store
            .collection(EVENTS_COLLECTION)
            .count(&[])
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped_without_breaking_subscription() {
        let pipeline = pipeline().await;
        pipeline
            .bus
            .publish("service-a/events/DB_SEARCH", b"not json".to_vec())
            .await
            .unwrap();

        assert_eq!(
            pipeline
                .store
                .collection(EVENTS_COLLECTION)
                .count(&[])
                .await
                .unwrap(),
            0
        );

        // A well-formed message afterwards still lands.
        pipeline.emitter.record(EventDraft::default()).await.unwrap();
        assert_eq!(
            pipeline
                .store
                .collection(EVENTS_COLLECTION)
                .count(&[])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_event_by_id_round_trip_and_not_found() {
        let pipeline = pipeline().await;
        let event = pipeline.emitter.record(EventDraft::default()).await.unwrap();

        let found = pipeline.ingestor.event_by_id(&event.id).await;
        assert_eq!(found, Some(event));
        assert!(pipeline.ingestor.event_by_id("evt_missing").await.is_none());
    }
}

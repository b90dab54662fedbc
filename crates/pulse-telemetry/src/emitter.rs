use crate::{RETENTION_MS, cache_key, series_key};
use chrono::{Duration, Utc};
use pulse_bus::{MessageBus, topic};
use pulse_core::best_effort::best_effort;
use pulse_core::error::{EmitError, StoreError};
use pulse_core::types::{Event, EventDraft, EventType};
use pulse_db::{BlobCache, SeriesStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use ulid::Ulid;

/// Producer-side entry point: builds the canonical event, publishes it and
/// records the supplementary metric/cache copies.
pub struct EventEmitter {
    service: String,
    bus: Arc<dyn MessageBus>,
    series: SeriesStore,
    cache: BlobCache,
}

impl EventEmitter {
    pub fn new(
        service: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        series: SeriesStore,
        cache: BlobCache,
    ) -> Self {
        Self {
            service: service.into(),
            bus,
            series,
            cache,
        }
    }

    /// Fills the draft's missing fields, publishes to
    /// `<service>/events/<TYPE>` and returns the event. Publish failures
    /// propagate; the metric and cache writes afterwards are best-effort and
    /// can never fail the triggering operation.
    pub async fn record(&self, draft: EventDraft) -> Result<Event, EmitError> {
        let event = self.build(draft);
        let payload = serde_json::to_vec(&event).map_err(|err| EmitError::Encode {
            message: err.to_string(),
        })?;
        // The topic prefix is always this emitter's service, even when the
        // draft carries another service name in the event body.
        let topic = topic::event_topic(&self.service, event.event_type);
        self.bus.publish(&topic, payload).await?;

        best_effort("metric write", self.log_metrics(&event)).await;

        info!("event published: {} ({})", event.event_type, event.id);
        Ok(event)
    }

    fn build(&self, draft: EventDraft) -> Event {
        Event {
            id: draft.id.unwrap_or_else(|| format!("evt_{}", Ulid::new())),
            event_type: draft.event_type.unwrap_or(EventType::ApiRequest),
            sub_type: draft.sub_type,
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            service: draft.service.unwrap_or_else(|| self.service.clone()),
            request: draft.request,
            response: draft.response,
            execution_time: draft.execution_time,
            metadata: draft.metadata,
        }
    }

    async fn log_metrics(&self, event: &Event) -> Result<(), StoreError> {
        let key = series_key(event.event_type, &event.service);
        let labels = HashMap::from([
            ("type".to_string(), event.event_type.to_string()),
            ("service".to_string(), event.service.clone()),
        ]);
        self.series.create(&key, RETENTION_MS, &labels).await?;

        let value = event.execution_time.map_or(0.0, |ms| ms as f64);
        self.series
            .add(&key, Some(event.timestamp.timestamp_millis()), value)
            .await?;

        let body = serde_json::to_string(event).map_err(|err| StoreError::JsonEncode {
            message: err.to_string(),
        })?;
        self.cache
            .put(&cache_key(&event.id), &body, Duration::milliseconds(RETENTION_MS))
            .await?;
        Ok(())
    }
}

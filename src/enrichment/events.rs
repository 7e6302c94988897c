//! Run lifecycle events.
//!
//! The orchestrator publishes [`EnrichmentEvent`]s through an
//! [`EventPublisher`]. Publishing never blocks and never fails the run: with
//! no subscribers the event is dropped, and a subscriber that falls behind
//! loses the oldest events instead of stalling the publisher.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use super::domain::{ProviderFailure, RunOutcome};
use crate::model::{EntityType, MetadataField};

/// Events kept for slow subscribers before they start lagging
const DEFAULT_CAPACITY: usize = 256;

/// Which entity an event is about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntity {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub entity_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedEvent {
    #[serde(flatten)]
    pub entity: EventEntity,
    pub run_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub entity: EventEntity,
    pub run_id: i64,
    pub total: usize,
    pub current: usize,
    /// What just finished, e.g. "lastfm"
    pub step: String,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedEvent {
    #[serde(flatten)]
    pub entity: EventEntity,
    pub run_id: i64,
    pub bio_updated: bool,
    pub images_updated: bool,
    pub cover_updated: bool,
    /// Milliseconds
    pub duration: u64,
    pub status: RunOutcome,
    pub fields_updated: Vec<MetadataField>,
    pub conflicts_queued: usize,
    pub failed_providers: Vec<ProviderFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub entity: EventEntity,
    pub run_id: Option<i64>,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    #[serde(rename = "enrichment:started")]
    Started(StartedEvent),
    #[serde(rename = "enrichment:progress")]
    Progress(ProgressEvent),
    #[serde(rename = "enrichment:completed")]
    Completed(CompletedEvent),
    #[serde(rename = "enrichment:error")]
    Error(ErrorEvent),
}

impl EnrichmentEvent {
    /// Channel name, as used by the event stream.
    pub fn event_name(&self) -> &'static str {
        match self {
            EnrichmentEvent::Started(_) => "enrichment:started",
            EnrichmentEvent::Progress(_) => "enrichment:progress",
            EnrichmentEvent::Completed(_) => "enrichment:completed",
            EnrichmentEvent::Error(_) => "enrichment:error",
        }
    }

    pub fn entity(&self) -> &EventEntity {
        match self {
            EnrichmentEvent::Started(e) => &e.entity,
            EnrichmentEvent::Progress(e) => &e.entity,
            EnrichmentEvent::Completed(e) => &e.entity,
            EnrichmentEvent::Error(e) => &e.entity,
        }
    }
}

/// Sink for run events. Implementations must return immediately.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EnrichmentEvent);
}

/// In-process publish/subscribe fan-out.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    sender: broadcast::Sender<EnrichmentEvent>,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for ProgressNotifier {
    fn publish(&self, event: EnrichmentEvent) {
        let name = event.event_name();
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            trace!(event = name, "No subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> EventEntity {
        EventEntity {
            entity_type: EntityType::Album,
            entity_id: 7,
            entity_name: "Mezzanine".to_string(),
        }
    }

    fn progress(current: usize) -> EnrichmentEvent {
        EnrichmentEvent::Progress(ProgressEvent {
            entity: entity(),
            run_id: 1,
            total: 4,
            current,
            step: "musicbrainz".to_string(),
            percentage: (current * 25) as u8,
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = ProgressNotifier::default();
        notifier.publish(progress(1));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let notifier = ProgressNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.publish(progress(2));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "enrichment:progress");
        assert_eq!(event.entity().entity_id, 7);
    }

    #[tokio::test]
    async fn test_slow_subscriber_never_blocks() {
        let notifier = ProgressNotifier::new(2);
        let mut rx = notifier.subscribe();

        // Far more than capacity; publish must not wait on the receiver
        for i in 0..50 {
            notifier.publish(progress(i));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        // the newest events are still there
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_json_shape() {
        let event = EnrichmentEvent::Completed(CompletedEvent {
            entity: entity(),
            run_id: 3,
            bio_updated: true,
            images_updated: false,
            cover_updated: true,
            duration: 1200,
            status: RunOutcome::Partial,
            fields_updated: vec![MetadataField::Cover],
            conflicts_queued: 1,
            failed_providers: vec![],
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "enrichment:completed");
        assert_eq!(json["entityType"], "album");
        assert_eq!(json["entityName"], "Mezzanine");
        assert_eq!(json["bioUpdated"], true);
        assert_eq!(json["coverUpdated"], true);
        assert_eq!(json["status"], "partial");
        assert_eq!(json["fieldsUpdated"][0], "cover");
    }
}

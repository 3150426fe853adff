//! Injected observability sinks.
//!
//! The engine reports drift, non-fatal issues, and per-import summaries
//! through an [`Observer`] instead of process-wide logging, so tests can
//! assert on exactly what was reported. Observers are synchronous and
//! infallible: a slow or broken sink must never stall or fail an import.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::drift::DriftEvent;
use crate::error::IngestIssue;
use crate::importer::ImportSummary;

pub trait Observer: Send + Sync {
    /// A label or category outside the known vocabulary was seen.
    fn drift(&self, source_product_id: &str, event: &DriftEvent);

    /// A non-fatal issue occurred while importing a product.
    fn issue(&self, source_product_id: &str, issue: &IngestIssue);

    /// A product import finished and was committed.
    fn imported(&self, summary: &ImportSummary);
}

/// Forwards every event to `tracing` as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn drift(&self, source_product_id: &str, event: &DriftEvent) {
        tracing::warn!(
            product = %source_product_id,
            category = %event.category,
            unknown_key = %event.unknown_key,
            "schema drift: unknown key"
        );
    }

    fn issue(&self, source_product_id: &str, issue: &IngestIssue) {
        match issue {
            IngestIssue::Persistence { .. } => tracing::error!(
                product = %source_product_id,
                kind = issue.kind(),
                error = %issue,
                "sub-object abandoned"
            ),
            _ => tracing::warn!(
                product = %source_product_id,
                kind = issue.kind(),
                error = %issue,
                "import issue"
            ),
        }
    }

    fn imported(&self, summary: &ImportSummary) {
        tracing::info!(
            product = %summary.source_product_id,
            categories_imported = summary.categories_imported,
            categories_skipped_unknown = summary.categories_skipped_unknown,
            fields_changed = summary.fields_changed,
            unknown_keys = summary.unknown_keys_seen.len(),
            issues = summary.issues,
            "product imported"
        );
    }
}

/// One observed event, as stored by [`RecordingObserver`] or sent by
/// [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Drift {
        source_product_id: String,
        event: DriftEvent,
    },
    Issue {
        source_product_id: String,
        issue: IngestIssue,
    },
    Imported(ImportSummary),
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<IngestEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<IngestEvent> {
        self.lock().clone()
    }

    #[must_use]
    pub fn drift_events(&self) -> Vec<DriftEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                IngestEvent::Drift { event, .. } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn issues(&self) -> Vec<IngestIssue> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                IngestEvent::Issue { issue, .. } => Some(issue.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<ImportSummary> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                IngestEvent::Imported(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IngestEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: IngestEvent) {
        self.lock().push(event);
    }
}

impl Observer for RecordingObserver {
    fn drift(&self, source_product_id: &str, event: &DriftEvent) {
        self.push(IngestEvent::Drift {
            source_product_id: source_product_id.to_string(),
            event: event.clone(),
        });
    }

    fn issue(&self, source_product_id: &str, issue: &IngestIssue) {
        self.push(IngestEvent::Issue {
            source_product_id: source_product_id.to_string(),
            issue: issue.clone(),
        });
    }

    fn imported(&self, summary: &ImportSummary) {
        self.push(IngestEvent::Imported(summary.clone()));
    }
}

/// Hands events to an external sink over a bounded channel.
///
/// Uses `try_send`: when the channel is full or the receiver is gone the
/// event is dropped and counted, and the import carries on.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: mpsc::Sender<IngestEvent>,
    dropped: AtomicU64,
}

impl ChannelObserver {
    /// Create an observer and the receiving half of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<IngestEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Number of events dropped because the sink was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event: IngestEvent) {
        if let Err(err) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %err, "observability sink unavailable; event dropped");
        }
    }
}

impl Observer for ChannelObserver {
    fn drift(&self, source_product_id: &str, event: &DriftEvent) {
        self.send(IngestEvent::Drift {
            source_product_id: source_product_id.to_string(),
            event: event.clone(),
        });
    }

    fn issue(&self, source_product_id: &str, issue: &IngestIssue) {
        self.send(IngestEvent::Issue {
            source_product_id: source_product_id.to_string(),
            issue: issue.clone(),
        });
    }

    fn imported(&self, summary: &ImportSummary) {
        self.send(IngestEvent::Imported(summary.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drift(key: &str) -> DriftEvent {
        DriftEvent {
            category: "RAM".to_string(),
            unknown_key: key.to_string(),
        }
    }

    #[test]
    fn recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.drift("p-1", &drift("Voltage"));
        observer.drift("p-1", &drift("Heatsink"));
        let keys: Vec<_> = observer
            .drift_events()
            .into_iter()
            .map(|e| e.unknown_key)
            .collect();
        assert_eq!(keys, vec!["Voltage", "Heatsink"]);
        assert!(observer.issues().is_empty());
    }

    #[tokio::test]
    async fn channel_observer_delivers_events() {
        let (observer, mut receiver) = ChannelObserver::channel(4);
        observer.drift("p-1", &drift("Voltage"));
        let received = receiver.recv().await.expect("event delivered");
        assert_eq!(
            received,
            IngestEvent::Drift {
                source_product_id: "p-1".to_string(),
                event: drift("Voltage"),
            }
        );
        assert_eq!(observer.dropped(), 0);
    }

    #[test]
    fn channel_observer_drops_when_full() {
        let (observer, _receiver) = ChannelObserver::channel(1);
        observer.drift("p-1", &drift("a"));
        observer.drift("p-1", &drift("b"));
        observer.drift("p-1", &drift("c"));
        assert_eq!(observer.dropped(), 2);
    }

    #[test]
    fn channel_observer_survives_closed_receiver() {
        let (observer, receiver) = ChannelObserver::channel(8);
        drop(receiver);
        observer.drift("p-1", &drift("a"));
        assert_eq!(observer.dropped(), 1);
    }
}

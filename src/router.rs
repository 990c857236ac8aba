use crate::control::SharedControlState;
use crate::dedup::RecentEventWindow;
use crate::event::DetectionEvent;
use crate::filter::DetectionFilter;
use crate::gate::{self, GateDecision};
use crate::notify::NotificationSink;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What the router did with one event. Delivery failure still counts as
/// routed: the dedup window has already recorded the id and there is no
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the sink (delivery itself may still have failed and been logged)
    Delivered,
    /// Identifier already in the recent-event window
    Duplicate,
    /// Camera or label did not match the configured predicate
    Filtered,
    /// Event carries no media to notify with
    NoMedia,
    /// The gate vetoed the notification at this instant
    Denied(GateDecision),
}

/// Single-consumer event pipeline: dedup, then the camera/label predicate,
/// then the gate, then the sink.
///
/// Gating is a point-in-time decision. A denied event is dropped for good;
/// nothing is buffered for re-evaluation when control state later changes.
pub struct EventRouter {
    dedup: RecentEventWindow,
    filter: DetectionFilter,
    state: SharedControlState,
    sink: Arc<dyn NotificationSink>,
}

impl EventRouter {
    pub fn new(
        filter: DetectionFilter,
        state: SharedControlState,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            dedup: RecentEventWindow::new(),
            filter,
            state,
            sink,
        }
    }

    pub async fn on_event(&mut self, event: DetectionEvent) -> RouteOutcome {
        if !self.dedup.accept(&event.id) {
            return RouteOutcome::Duplicate;
        }

        if !self.filter.matches(&event) {
            debug!(
                event_id = %event.id,
                camera = %event.camera,
                label = %event.label,
                "event does not match camera/label filter"
            );
            return RouteOutcome::Filtered;
        }

        if !event.has_snapshot {
            debug!(event_id = %event.id, "event has no snapshot, nothing to notify with");
            return RouteOutcome::NoMedia;
        }

        let decision = gate::evaluate_now(&self.state.snapshot());
        if !decision.is_allowed() {
            info!(event_id = %event.id, ?decision, "notification gated");
            return RouteOutcome::Denied(decision);
        }

        if let Err(err) = self.sink.deliver(&event).await {
            // Processed regardless: a retry would be indistinguishable from a duplicate
            error!(event_id = %event.id, error = %err, "notification delivery failed");
        }
        RouteOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlMessage;
    use crate::error::{NotifyError, Result};
    use crate::filter::ALL_CAMERAS;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn ids(&self) -> Vec<String> {
            self.delivered.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, event: &DetectionEvent) -> Result<()> {
            self.delivered.lock().push(event.id.clone());
            if self.fail {
                return Err(NotifyError::component("sink", "simulated failure"));
            }
            Ok(())
        }
    }

    fn event(id: &str, camera: &str, label: &str) -> DetectionEvent {
        DetectionEvent {
            id: id.to_string(),
            camera: camera.to_string(),
            label: label.to_string(),
            has_snapshot: true,
            raw: serde_json::Value::Null,
        }
    }

    fn router(sink: Arc<RecordingSink>) -> EventRouter {
        EventRouter::new(
            DetectionFilter::new(vec!["front".to_string()], "person"),
            SharedControlState::new(),
            sink,
        )
    }

    #[tokio::test]
    async fn pipeline_dedups_then_filters_then_delivers() {
        let sink = RecordingSink::new();
        let mut router = router(Arc::clone(&sink));

        assert_eq!(
            router.on_event(event("a", "front", "person")).await,
            RouteOutcome::Delivered
        );
        // Repeat of "a" is dropped before any filter or gate work
        assert_eq!(
            router.on_event(event("a", "front", "person")).await,
            RouteOutcome::Duplicate
        );
        // "b" is a car: past dedup, stopped by the label predicate
        assert_eq!(
            router.on_event(event("b", "front", "car")).await,
            RouteOutcome::Filtered
        );

        assert_eq!(sink.ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn wrong_camera_is_filtered() {
        let sink = RecordingSink::new();
        let mut router = router(Arc::clone(&sink));
        assert_eq!(
            router.on_event(event("c", "garage", "person")).await,
            RouteOutcome::Filtered
        );
        assert!(sink.ids().is_empty());
    }

    #[tokio::test]
    async fn event_without_media_never_consults_the_gate() {
        let sink = RecordingSink::new();
        let mut router = router(Arc::clone(&sink));
        let mut ev = event("d", "front", "person");
        ev.has_snapshot = false;
        assert_eq!(router.on_event(ev).await, RouteOutcome::NoMedia);
        assert!(sink.ids().is_empty());
    }

    #[tokio::test]
    async fn gate_denial_drops_with_no_retry() {
        let sink = RecordingSink::new();
        let state = SharedControlState::new();
        state.apply(
            &ControlMessage::EmailSendingToggled { enabled: false },
            Utc::now(),
        );
        let mut router = EventRouter::new(
            DetectionFilter::new(vec![ALL_CAMERAS.to_string()], "person"),
            state.clone(),
            sink.clone(),
        );

        assert_eq!(
            router.on_event(event("e", "front", "person")).await,
            RouteOutcome::Denied(GateDecision::Disabled)
        );
        assert!(sink.ids().is_empty());

        // Re-enabling later does not resurrect the dropped event, and its id
        // is already burned in the dedup window
        state.apply(
            &ControlMessage::EmailSendingToggled { enabled: true },
            Utc::now(),
        );
        assert_eq!(
            router.on_event(event("e", "front", "person")).await,
            RouteOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_logged_and_event_counts_as_processed() {
        let sink = RecordingSink::failing();
        let mut router = EventRouter::new(
            DetectionFilter::new(vec![ALL_CAMERAS.to_string()], "person"),
            SharedControlState::new(),
            sink.clone(),
        );

        assert_eq!(
            router.on_event(event("f", "front", "person")).await,
            RouteOutcome::Delivered
        );
        // The failed event is not retried: its id is in the dedup window
        assert_eq!(
            router.on_event(event("f", "front", "person")).await,
            RouteOutcome::Duplicate
        );
        assert_eq!(sink.ids(), vec!["f".to_string()]);
    }
}

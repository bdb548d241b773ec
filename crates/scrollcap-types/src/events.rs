use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one capture pipeline run, modeled as an explicit state
/// machine instead of implicit control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturePhase {
    Idle,
    Selecting,
    Capturing,
    Stitching,
    Encoding,
    Delivering,
    Cancelled,
    Failed,
}

impl CapturePhase {
    /// Legal phase transitions. `Encoding` is reachable from `Idle` so an
    /// already-stitched composite can be re-encoded in another format without
    /// re-running the scroll loop.
    pub fn can_transition(self, next: CapturePhase) -> bool {
        use CapturePhase::*;
        match self {
            Idle => matches!(next, Selecting | Capturing | Encoding),
            Selecting => matches!(next, Capturing | Idle),
            Capturing => matches!(next, Stitching | Cancelled | Failed),
            Stitching => matches!(next, Encoding | Failed),
            Encoding => matches!(next, Delivering | Failed),
            Delivering => matches!(next, Idle | Failed),
            Cancelled => matches!(next, Idle),
            Failed => matches!(next, Idle),
        }
    }
}

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Frame,
    Progress,
    Delivery,
    Ops,
}

/// Immutable event envelope for logging, progress reporting, and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Frame(FrameEvent),
    Progress(ProgressEvent),
    Delivery(DeliveryEvent),
    Ops(OpsEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: CapturePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEvent {
    pub index: u32,
    pub document_y: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub frames_captured: u32,
    pub frames_expected: u32,
    pub percent_complete: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub location: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    pub message: String,
    pub tags: Vec<String>,
}

impl CaptureEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CapturePhase::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [Idle, Selecting, Capturing, Stitching, Encoding, Delivering, Idle];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition(pair[1]),
                "{:?} -> {:?} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_phases_return_to_idle() {
        assert!(Capturing.can_transition(Cancelled));
        assert!(Cancelled.can_transition(Idle));
        for phase in [Capturing, Stitching, Encoding, Delivering] {
            assert!(phase.can_transition(Failed));
        }
        assert!(Failed.can_transition(Idle));
    }

    #[test]
    fn skipping_pipeline_stages_is_illegal() {
        assert!(!Idle.can_transition(Stitching));
        assert!(!Idle.can_transition(Delivering));
        assert!(!Capturing.can_transition(Encoding));
        assert!(!Stitching.can_transition(Delivering));
        assert!(!Cancelled.can_transition(Capturing));
    }

    #[test]
    fn reencoding_a_finished_composite_is_legal_from_idle() {
        assert!(Idle.can_transition(Encoding));
    }

    #[test]
    fn event_envelope_carries_kind_and_payload() {
        let event = CaptureEvent::new(
            EventKind::Frame,
            EventPayload::Frame(FrameEvent {
                index: 0,
                document_y: 1000,
            }),
        );
        assert_eq!(event.kind, EventKind::Frame);
        assert!(matches!(
            event.payload,
            EventPayload::Frame(FrameEvent { document_y: 1000, .. })
        ));
    }
}

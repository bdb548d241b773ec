use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timing of a single viewport capture call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameTiming {
    pub capture_ms: u64,
    pub captured_at: DateTime<Utc>,
}

/// One row per finished (or aborted) capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub frames: u32,
    pub cancelled: bool,
    pub duration_ms: u64,
}

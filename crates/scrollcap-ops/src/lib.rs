//! Operational helpers: logging, session journaling, artifact directories.

use std::{path::PathBuf, sync::Arc};

use scrollcap_types::{
    config::OpsConfig, events::CaptureEvent, telemetry::SessionSummary, Result, ScrollCapError,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ScrollCapError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ScrollCapError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// In-memory journal of pipeline events and finished sessions.
#[derive(Clone, Default)]
pub struct SessionJournal {
    events: Arc<Mutex<Vec<CaptureEvent>>>,
    sessions: Arc<Mutex<Vec<SessionSummary>>>,
}

impl SessionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: CaptureEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn record_session(&self, summary: SessionSummary) -> Result<()> {
        self.sessions.lock().await.push(summary);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<CaptureEvent> {
        self.events.lock().await.clone()
    }

    pub async fn snapshot_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.lock().await.clone()
    }
}

pub fn ensure_artifact_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| ScrollCapError::Ops(format!("failed to create artifact dir: {err}")))?;
    info!("Artifact directory ready at {:?}", dir);
    Ok(dir)
}

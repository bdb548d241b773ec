//! High-level orchestrator driving the scroll/capture/stitch/encode/deliver
//! pipeline.
//!
//! One logical thread of control per capture session: scroll position is a
//! single shared resource, so the loop is inherently sequential. Suspension
//! happens only at the settle wait and the capture call, both cancellable.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use chrono::Utc;
use scrollcap_compositor::stitch;
use scrollcap_delivery::{DeliveryChannel, DeliveryReceipt, EventSink};
use scrollcap_ops::SessionJournal;
use scrollcap_types::{
    capture::{CaptureSession, CapturedFrame, CompositeImage},
    config::{CaptureConfig, OutputConfig},
    events::{
        CaptureEvent, CapturePhase, DeliveryEvent, EventKind, EventPayload, FrameEvent,
        LifecycleEvent, ProgressEvent,
    },
    geometry::{DocPoint, SelectionRect},
    output::OutputFormat,
    telemetry::SessionSummary,
    Result, ScrollCapError,
};
use scrollcap_viewport::ViewportDriver;
use tokio::time::{sleep, timeout, Duration};
use tracing::{info, warn};

mod controller;

pub use controller::{CaptureCommand, CommandOutcome, SessionController};

/// Cooperative cancellation flag, checked at the top of each loop iteration
/// and around the settle wait.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Explicit pipeline state machine; transitions are validated against
/// [`CapturePhase::can_transition`] so cancellation and error propagation stay
/// uniform instead of being buried in control flow.
struct PhaseTracker {
    current: Mutex<CapturePhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: Mutex::new(CapturePhase::Idle),
        }
    }

    fn current(&self) -> CapturePhase {
        self.current
            .lock()
            .map(|guard| *guard)
            .unwrap_or(CapturePhase::Failed)
    }

    fn transition(&self, next: CapturePhase) -> Result<()> {
        let mut guard = self
            .current
            .lock()
            .map_err(|_| ScrollCapError::InvalidState("phase tracker poisoned".into()))?;
        if !guard.can_transition(next) {
            return Err(ScrollCapError::InvalidState(format!(
                "illegal phase transition {:?} -> {:?}",
                *guard, next
            )));
        }
        *guard = next;
        Ok(())
    }
}

/// Guard holding the single-session slot; released on drop so every exit path
/// (success, cancellation, failure) frees it.
struct ActiveGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ScrollCapError::SessionAlreadyActive)?;
        Ok(Self { flag })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator<D, S, F>
where
    D: ViewportDriver,
    S: DeliveryChannel,
    F: EventSink,
{
    driver: D,
    delivery: S,
    feed: F,
    journal: SessionJournal,
    capture: CaptureConfig,
    output: OutputConfig,
    phases: PhaseTracker,
    active: AtomicBool,
    cancel: CancelHandle,
}

impl<D, S, F> Orchestrator<D, S, F>
where
    D: ViewportDriver,
    S: DeliveryChannel,
    F: EventSink,
{
    pub fn new(
        capture: CaptureConfig,
        output: OutputConfig,
        driver: D,
        delivery: S,
        feed: F,
        journal: SessionJournal,
    ) -> Self {
        Self {
            driver,
            delivery,
            feed,
            journal,
            capture,
            output,
            phases: PhaseTracker::new(),
            active: AtomicBool::new(false),
            cancel: CancelHandle::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> CapturePhase {
        self.phases.current()
    }

    /// Runs the scroll/capture loop for the given selection and returns the
    /// recorded session. Rejects with `SessionAlreadyActive` while another
    /// session holds the slot; always restores the pre-capture scroll offset.
    pub async fn run_session(&self, selection: SelectionRect) -> Result<CaptureSession> {
        let _slot = ActiveGuard::acquire(&self.active)?;
        self.cancel.reset();

        let viewport_height = self.driver.viewport_height();
        if viewport_height == 0 {
            return Err(ScrollCapError::CaptureFailed(
                "viewport reports a zero height".into(),
            ));
        }
        let document_height = self.driver.document_height();
        // The selection's height is the vertical extent to capture; the
        // document end bounds it.
        let extent = selection.height.min(document_height);
        let original_offset = self.driver.scroll_offset().await?;

        let mut session = CaptureSession::new(
            selection,
            extent,
            document_height,
            self.driver.device_pixel_ratio(),
        );
        let expected = session.expected_frames(viewport_height);
        info!(
            extent,
            viewport_height, expected, "starting scroll capture session"
        );

        let outcome = self
            .capture_loop(&mut session, extent, viewport_height, expected)
            .await;

        // Cleanup guarantee: the page scrolls back to where the user left it
        // no matter how the loop ended.
        if let Err(err) = self.driver.set_scroll_offset(original_offset).await {
            warn!("failed to restore scroll offset after capture: {err}");
        }

        outcome?;
        info!(
            frames = session.frame_count(),
            cancelled = session.cancelled,
            "scroll capture session finished"
        );
        Ok(session)
    }

    async fn capture_loop(
        &self,
        session: &mut CaptureSession,
        extent: u32,
        viewport_height: u32,
        expected: u32,
    ) -> Result<()> {
        let settle = Duration::from_millis(self.capture.settle_delay_ms);
        let capture_timeout = Duration::from_millis(self.capture.capture_timeout_ms);
        let mut scroll_offset = 0u32;
        let mut index = 0u32;

        while scroll_offset < extent {
            if self.cancel.is_cancelled() {
                session.cancelled = true;
                break;
            }

            self.driver.set_scroll_offset(scroll_offset).await?;
            // Give lazy content a chance to render before the frame is taken.
            sleep(settle).await;
            if self.cancel.is_cancelled() {
                session.cancelled = true;
                break;
            }

            let raster = match timeout(capture_timeout, self.driver.capture_frame()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ScrollCapError::CaptureFailed(format!(
                        "viewport capture exceeded {}ms",
                        self.capture.capture_timeout_ms
                    )))
                }
            };

            session.push_frame(CapturedFrame {
                raster,
                document_position: DocPoint::new(session.selection.x, scroll_offset),
                viewport_height,
            });

            self.publish(CaptureEvent::new(
                EventKind::Frame,
                EventPayload::Frame(FrameEvent {
                    index,
                    document_y: scroll_offset,
                }),
            ))
            .await?;
            let captured = session.frame_count() as u32;
            self.publish(CaptureEvent::new(
                EventKind::Progress,
                EventPayload::Progress(ProgressEvent {
                    frames_captured: captured,
                    frames_expected: expected,
                    percent_complete: ((captured as u64 * 100) / expected.max(1) as u64) as u8,
                }),
            ))
            .await?;

            index += 1;
            // The last step is deliberately shorter so the loop never
            // overshoots the capture extent.
            scroll_offset += viewport_height.min(extent - scroll_offset);
        }

        Ok(())
    }

    /// Full pipeline: capture, stitch, encode, deliver. Returns `None` when
    /// the session was cancelled mid-capture. Every error path lands the
    /// state machine back on `Idle` via `Failed`.
    pub async fn capture_and_deliver(
        &self,
        selection: SelectionRect,
    ) -> Result<Option<DeliveryReceipt>> {
        if self.is_active() {
            return Err(ScrollCapError::SessionAlreadyActive);
        }
        self.advance(
            CapturePhase::Capturing,
            Some(format!(
                "selection {}x{} at ({}, {})",
                selection.width, selection.height, selection.x, selection.y
            )),
        )
        .await?;

        match self.pipeline(selection).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn pipeline(&self, selection: SelectionRect) -> Result<Option<DeliveryReceipt>> {
        if selection.is_empty() {
            return Err(ScrollCapError::InvalidState(
                "selection has no area to capture".into(),
            ));
        }

        let session = self.run_session(selection).await?;
        if session.cancelled {
            self.advance(
                CapturePhase::Cancelled,
                Some(format!("cancelled after {} frames", session.frame_count())),
            )
            .await?;
            self.advance(CapturePhase::Idle, None).await?;
            self.record_summary(&session).await;
            return Ok(None);
        }

        self.advance(CapturePhase::Stitching, None).await?;
        let composite = stitch(&session)?;
        self.record_summary(&session).await;

        let receipt = self
            .encode_and_deliver(&composite, self.output.format, Some(self.output.jpeg_quality))
            .await?;
        self.advance(CapturePhase::Idle, None).await?;
        Ok(Some(receipt))
    }

    /// Re-encodes an already stitched composite in another format and
    /// delivers it, without re-running the scroll loop.
    pub async fn deliver_composite(
        &self,
        composite: &CompositeImage,
        format: OutputFormat,
        quality: Option<f32>,
    ) -> Result<DeliveryReceipt> {
        match self.encode_and_deliver(composite, format, quality).await {
            Ok(receipt) => {
                self.advance(CapturePhase::Idle, None).await?;
                Ok(receipt)
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn encode_and_deliver(
        &self,
        composite: &CompositeImage,
        format: OutputFormat,
        quality: Option<f32>,
    ) -> Result<DeliveryReceipt> {
        self.advance(CapturePhase::Encoding, None).await?;
        let output = scrollcap_encoder::encode(composite, format, quality)?;

        self.advance(
            CapturePhase::Delivering,
            Some(output.suggested_filename.clone()),
        )
        .await?;
        let receipt = self.delivery.save(&output).await?;
        self.publish(CaptureEvent::new(
            EventKind::Delivery,
            EventPayload::Delivery(DeliveryEvent {
                location: receipt.location.clone(),
                bytes: receipt.bytes,
            }),
        ))
        .await?;
        Ok(receipt)
    }

    pub(crate) async fn advance(
        &self,
        phase: CapturePhase,
        details: Option<String>,
    ) -> Result<()> {
        self.phases.transition(phase)?;
        self.publish(CaptureEvent::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent { phase, details }),
        ))
        .await
    }

    async fn fail(&self, err: &ScrollCapError) {
        if let Err(transition_err) = self.advance(CapturePhase::Failed, Some(err.to_string())).await
        {
            warn!("could not mark pipeline as failed: {transition_err}");
            return;
        }
        if let Err(transition_err) = self.advance(CapturePhase::Idle, None).await {
            warn!("could not reset pipeline to idle: {transition_err}");
        }
    }

    async fn publish(&self, event: CaptureEvent) -> Result<()> {
        let cloned = event.clone();
        self.feed.publish(event).await?;
        self.journal.record_event(cloned).await?;
        Ok(())
    }

    async fn record_summary(&self, session: &CaptureSession) {
        let duration_ms = (Utc::now() - session.started_at)
            .num_milliseconds()
            .max(0) as u64;
        let summary = SessionSummary {
            id: session.id,
            started_at: session.started_at,
            frames: session.frame_count() as u32,
            cancelled: session.cancelled,
            duration_ms,
        };
        if let Err(err) = self.journal.record_session(summary).await {
            warn!("failed to record session summary: {err}");
        }
    }
}

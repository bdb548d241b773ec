//! Command-driven session control.
//!
//! The UI surface talks to the pipeline through a tagged command type with
//! one handler arm per variant, checked exhaustively, instead of a single
//! handler branching on string-tagged messages.

use scrollcap_delivery::{DeliveryChannel, DeliveryReceipt, EventSink};
use scrollcap_selector::RegionSelector;
use scrollcap_types::{
    events::CapturePhase,
    geometry::{PointerPoint, SelectionRect},
    Result,
};
use scrollcap_viewport::ViewportDriver;
use tracing::info;

use crate::Orchestrator;

/// Everything the UI glue can ask the pipeline to do.
#[derive(Debug, Clone, Copy)]
pub enum CaptureCommand {
    PointerDown(PointerPoint),
    PointerMove(PointerPoint),
    PointerUp(PointerPoint),
    Cancel,
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Nothing to do, e.g. a pointer move with no drag in progress.
    Ignored,
    SelectionStarted,
    /// Live rectangle for overlay feedback; no contract on its value.
    SelectionPreview(SelectionRect),
    Delivered(DeliveryReceipt),
    /// The capture loop exited because of a cancel request.
    Cancelled,
    CancelRequested,
}

/// Owns the selector and the orchestrator for one page context and feeds
/// pointer gestures through to the pipeline.
pub struct SessionController<D, S, F>
where
    D: ViewportDriver,
    S: DeliveryChannel,
    F: EventSink,
{
    selector: RegionSelector,
    orchestrator: Orchestrator<D, S, F>,
}

impl<D, S, F> SessionController<D, S, F>
where
    D: ViewportDriver,
    S: DeliveryChannel,
    F: EventSink,
{
    pub fn new(orchestrator: Orchestrator<D, S, F>) -> Self {
        Self {
            selector: RegionSelector::new(),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<D, S, F> {
        &self.orchestrator
    }

    pub async fn handle(&mut self, command: CaptureCommand) -> Result<CommandOutcome> {
        match command {
            CaptureCommand::PointerDown(point) => {
                self.orchestrator
                    .advance(CapturePhase::Selecting, None)
                    .await?;
                self.selector.begin(point);
                Ok(CommandOutcome::SelectionStarted)
            }
            CaptureCommand::PointerMove(point) => Ok(self
                .selector
                .update(point)
                .map(CommandOutcome::SelectionPreview)
                .unwrap_or(CommandOutcome::Ignored)),
            CaptureCommand::PointerUp(point) => {
                let selection = match self.selector.finish(point) {
                    Ok(rect) => rect,
                    Err(err) => {
                        // Leave the machine usable; the selection never
                        // existed, so there is nothing to fail.
                        let _ = self
                            .orchestrator
                            .advance(CapturePhase::Idle, Some("selection abandoned".into()))
                            .await;
                        return Err(err);
                    }
                };
                info!(?selection, "selection finished, starting capture");
                match self.orchestrator.capture_and_deliver(selection).await? {
                    Some(receipt) => Ok(CommandOutcome::Delivered(receipt)),
                    None => Ok(CommandOutcome::Cancelled),
                }
            }
            CaptureCommand::Cancel => {
                self.orchestrator.cancel_handle().cancel();
                Ok(CommandOutcome::CancelRequested)
            }
        }
    }
}

//! Pointer-drag region selection.
//!
//! Turns a begin/update/finish pointer gesture into a normalized
//! [`SelectionRect`]. Any visual overlay is owned by the caller; this
//! component only tracks the anchor and computes rectangles.

use scrollcap_types::{
    geometry::{PointerPoint, SelectionRect},
    Result, ScrollCapError,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RegionSelector {
    anchor: Option<PointerPoint>,
    live: Option<SelectionRect>,
}

impl RegionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the anchor corner of the drag. Restarting a selection simply
    /// moves the anchor.
    pub fn begin(&mut self, point: PointerPoint) {
        debug!(x = point.x, y = point.y, "selection anchor set");
        self.anchor = Some(point);
        self.live = Some(SelectionRect::from_corners(point, point));
    }

    /// Recomputes the live rectangle for visual feedback. No contract on the
    /// intermediate values; returns `None` when no drag is in progress.
    pub fn update(&mut self, point: PointerPoint) -> Option<SelectionRect> {
        let anchor = self.anchor?;
        let rect = SelectionRect::from_corners(anchor, point);
        self.live = Some(rect);
        Some(rect)
    }

    /// Ends the drag and returns the normalized rectangle. The anchor is
    /// consumed; calling `finish` without a preceding `begin` is an error
    /// rather than a malformed rectangle.
    pub fn finish(&mut self, point: PointerPoint) -> Result<SelectionRect> {
        let anchor = self.anchor.take().ok_or_else(|| {
            ScrollCapError::InvalidState("selection finished before it was begun".into())
        })?;
        self.live = None;
        let rect = SelectionRect::from_corners(anchor, point);
        debug!(?rect, "selection finished");
        Ok(rect)
    }

    pub fn is_selecting(&self) -> bool {
        self.anchor.is_some()
    }

    /// Current live rectangle, if a drag is in progress.
    pub fn live_rect(&self) -> Option<SelectionRect> {
        self.live
    }
}

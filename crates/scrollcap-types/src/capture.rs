use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{DocPoint, SelectionRect};

/// Raw RGBA viewport snapshot as returned by a viewport driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRaster {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl FrameRaster {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the byte buffer is consistent with the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() as u64 == self.width as u64 * self.height as u64 * 4
    }
}

/// A single viewport snapshot plus its document-space placement, recorded at
/// capture time from the requested scroll offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub raster: FrameRaster,
    pub document_position: DocPoint,
    /// Viewport height (logical pixels) at the moment of capture.
    pub viewport_height: u32,
}

/// The ordered record of one scroll-capture run. Created by the orchestrator,
/// mutated only by it, then handed read-only to the compositor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSession {
    pub id: Uuid,
    pub selection: SelectionRect,
    pub frames: Vec<CapturedFrame>,
    /// Vertical extent (document pixels) this session set out to capture.
    pub total_capture_height: u32,
    /// Full scrollable height of the document; the compositor needs it to
    /// detect scroll clamping at the document end.
    pub document_height: u32,
    pub device_pixel_ratio: f32,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn new(
        selection: SelectionRect,
        total_capture_height: u32,
        document_height: u32,
        device_pixel_ratio: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            selection,
            frames: Vec::new(),
            total_capture_height,
            document_height,
            device_pixel_ratio,
            cancelled: false,
            started_at: Utc::now(),
        }
    }

    /// Appends a frame; frames arrive strictly in increasing document order.
    pub fn push_frame(&mut self, frame: CapturedFrame) {
        debug_assert!(self
            .frames
            .last()
            .map(|prev| prev.document_position.y < frame.document_position.y)
            .unwrap_or(true));
        self.frames.push(frame);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames a complete run will produce: one per viewport-sized
    /// step, with a shorter final step.
    pub fn expected_frames(&self, viewport_height: u32) -> u32 {
        if viewport_height == 0 {
            return 0;
        }
        self.total_capture_height.div_ceil(viewport_height)
    }
}

/// The stitched raster, logically sized in document pixels and scaled
/// internally by the device pixel ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeImage {
    /// Logical size in document pixels.
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    /// Physical raster size after device-pixel-ratio scaling.
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Raw RGBA pixel buffer, `pixel_width * pixel_height * 4` bytes.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_frames_rounds_up() {
        let session = CaptureSession::new(SelectionRect::new(0, 0, 800, 2500), 2500, 2500, 1.0);
        assert_eq!(session.expected_frames(1000), 3);
        assert_eq!(session.expected_frames(2500), 1);
        assert_eq!(session.expected_frames(500), 5);
        assert_eq!(session.expected_frames(0), 0);
    }

    #[test]
    fn raster_well_formedness_tracks_dimensions() {
        let ok = FrameRaster::from_rgba(2, 3, vec![0; 24]);
        assert!(ok.is_well_formed());
        let bad = FrameRaster::from_rgba(2, 3, vec![0; 10]);
        assert!(!bad.is_well_formed());
        assert!(FrameRaster::empty().is_empty());
    }
}

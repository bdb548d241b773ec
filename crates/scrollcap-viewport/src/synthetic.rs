use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use chrono::Utc;
use image::{imageops, Rgba, RgbaImage};
use scrollcap_types::{
    capture::FrameRaster, geometry::scale_by_dpr, telemetry::FrameTiming, Result,
};
use tracing::debug;

use crate::{driver_error, DriverMetrics, ViewportDriver};

/// Scrollable document simulated from a single in-memory raster.
///
/// Behaves like a real browser viewport: `set_scroll_offset` clamps at
/// `document_height - viewport_height`, so a capture requested past the end
/// shows the trailing viewport-full of the page. That clamping is what makes
/// the compositor's last-frame crop observable in tests and demos.
#[derive(Debug)]
pub struct SyntheticPage {
    document: RgbaImage,
    viewport_width: u32,
    viewport_height: u32,
    document_height: u32,
    device_pixel_ratio: f32,
    scroll: Arc<Mutex<u32>>,
    metrics: Arc<Mutex<DriverMetrics>>,
}

impl SyntheticPage {
    /// Wraps an existing raster as the full document. The raster must be in
    /// physical pixels, i.e. already scaled by `device_pixel_ratio`.
    pub fn from_image(
        document: RgbaImage,
        viewport_width: u32,
        viewport_height: u32,
        device_pixel_ratio: f32,
    ) -> Result<Self> {
        if viewport_width == 0 || viewport_height == 0 {
            return Err(driver_error("viewport dimensions must be non-zero"));
        }
        if document.width() != scale_by_dpr(viewport_width, device_pixel_ratio) {
            return Err(driver_error(format!(
                "document width {} does not match viewport width {} at dpr {}",
                document.width(),
                viewport_width,
                device_pixel_ratio
            )));
        }
        let document_height =
            (document.height() as f64 / device_pixel_ratio as f64).round() as u32;
        Ok(Self {
            document,
            viewport_width,
            viewport_height,
            document_height,
            device_pixel_ratio,
            scroll: Arc::new(Mutex::new(0)),
            metrics: Arc::new(Mutex::new(DriverMetrics::default())),
        })
    }

    /// Builds a document whose pixels encode their own document-space
    /// position: red tracks `y % 256`, green `y / 256`, blue `x % 256`. Tests
    /// use the encoding to verify that stitched rows came from the right part
    /// of the page.
    pub fn gradient(
        viewport_width: u32,
        viewport_height: u32,
        document_height: u32,
        device_pixel_ratio: f32,
    ) -> Result<Self> {
        let px_width = scale_by_dpr(viewport_width, device_pixel_ratio);
        let px_height = scale_by_dpr(document_height, device_pixel_ratio);
        let document = RgbaImage::from_fn(px_width, px_height, |px, py| {
            let x = (px as f64 / device_pixel_ratio as f64) as u32;
            let y = (py as f64 / device_pixel_ratio as f64) as u32;
            Rgba([(y % 256) as u8, (y / 256 % 256) as u8, (x % 256) as u8, 0xff])
        });
        Self::from_image(document, viewport_width, viewport_height, device_pixel_ratio)
    }

    fn record_capture(&self, started: Instant) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.frames_captured += 1;
            guard.last_timing = Some(FrameTiming {
                capture_ms: started.elapsed().as_millis() as u64,
                captured_at: Utc::now(),
            });
        }
    }

    fn record_failure(&self) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.failed_captures += 1;
        }
    }
}

#[async_trait]
impl ViewportDriver for SyntheticPage {
    async fn capture_frame(&self) -> Result<FrameRaster> {
        let started = Instant::now();
        let scroll = self.scroll_offset().await?;
        let y0 = scale_by_dpr(scroll, self.device_pixel_ratio);
        let viewport_px = scale_by_dpr(self.viewport_height, self.device_pixel_ratio);
        let height = viewport_px.min(self.document.height().saturating_sub(y0));
        if height == 0 {
            self.record_failure();
            return Err(driver_error("viewport is entirely past the document end"));
        }
        let view = imageops::crop_imm(&self.document, 0, y0, self.document.width(), height)
            .to_image();
        debug!(scroll, height, "synthetic viewport captured");
        let (width, height) = view.dimensions();
        self.record_capture(started);
        Ok(FrameRaster::from_rgba(width, height, view.into_raw()))
    }

    async fn set_scroll_offset(&self, y: u32) -> Result<()> {
        let max = self.document_height.saturating_sub(self.viewport_height);
        let mut scroll = self
            .scroll
            .lock()
            .map_err(|_| driver_error("failed to lock scroll state"))?;
        *scroll = y.min(max);
        Ok(())
    }

    async fn scroll_offset(&self) -> Result<u32> {
        self.scroll
            .lock()
            .map(|guard| *guard)
            .map_err(|_| driver_error("failed to lock scroll state"))
    }

    fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    fn document_height(&self) -> u32 {
        self.document_height
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn metrics(&self) -> DriverMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_the_visible_slice() {
        let page = SyntheticPage::gradient(100, 50, 300, 1.0).expect("page");
        page.set_scroll_offset(120).await.expect("scroll");
        let frame = page.capture_frame().await.expect("capture");
        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 50);
        // First visible row is document row 120: red channel encodes y % 256.
        assert_eq!(frame.data[0], 120);
        // Last visible row is document row 169.
        let last_row_offset = (49 * 100 * 4) as usize;
        assert_eq!(frame.data[last_row_offset], 169);
    }

    #[tokio::test]
    async fn clamps_scroll_like_a_real_browser() {
        let page = SyntheticPage::gradient(100, 50, 300, 1.0).expect("page");
        page.set_scroll_offset(280).await.expect("scroll");
        assert_eq!(page.scroll_offset().await.expect("offset"), 250);
        let frame = page.capture_frame().await.expect("capture");
        // Clamped viewport shows the trailing 50 rows, starting at 250.
        assert_eq!(frame.data[0], (250u32 % 256) as u8);
    }

    #[tokio::test]
    async fn honors_device_pixel_ratio() {
        let page = SyntheticPage::gradient(100, 50, 300, 2.0).expect("page");
        let frame = page.capture_frame().await.expect("capture");
        assert_eq!(frame.width, 200);
        assert_eq!(frame.height, 100);
        assert!(frame.is_well_formed());
        assert_eq!(page.metrics().frames_captured, 1);
    }

    #[test]
    fn rejects_mismatched_document_width() {
        let document = RgbaImage::new(64, 128);
        let err = SyntheticPage::from_image(document, 100, 50, 1.0).unwrap_err();
        assert!(matches!(
            err,
            scrollcap_types::ScrollCapError::CaptureFailed(_)
        ));
    }
}

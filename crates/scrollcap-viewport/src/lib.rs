//! Viewport driver abstraction layer.
//!
//! The scroll loop needs exactly two things from its environment: pixels for
//! the currently visible viewport, and control over the scroll position. Both
//! sit behind [`ViewportDriver`] so the orchestrator never touches a real
//! page directly.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use scrollcap_types::{
    capture::FrameRaster, config::ViewportConfig, geometry::scale_by_dpr, telemetry::FrameTiming,
    Result, ScrollCapError,
};
use tokio::time::{sleep, Duration};
use tracing::info;

pub mod synthetic;

pub use synthetic::SyntheticPage;

/// Aggregated driver performance counters.
#[derive(Debug, Default, Clone)]
pub struct DriverMetrics {
    pub frames_captured: u64,
    pub failed_captures: u64,
    pub last_timing: Option<FrameTiming>,
}

/// Environment primitives the scroll-capture loop depends on. `capture_frame`
/// must return an image of exactly the currently visible viewport at the time
/// of the call.
#[async_trait]
pub trait ViewportDriver: Send + Sync {
    async fn capture_frame(&self) -> Result<FrameRaster>;
    async fn set_scroll_offset(&self, y: u32) -> Result<()>;
    async fn scroll_offset(&self) -> Result<u32>;
    fn viewport_width(&self) -> u32;
    fn viewport_height(&self) -> u32;
    fn document_height(&self) -> u32;
    fn device_pixel_ratio(&self) -> f32;
    fn metrics(&self) -> DriverMetrics;
}

#[async_trait]
impl<T> ViewportDriver for Arc<T>
where
    T: ViewportDriver + ?Sized,
{
    async fn capture_frame(&self) -> Result<FrameRaster> {
        self.as_ref().capture_frame().await
    }

    async fn set_scroll_offset(&self, y: u32) -> Result<()> {
        self.as_ref().set_scroll_offset(y).await
    }

    async fn scroll_offset(&self) -> Result<u32> {
        self.as_ref().scroll_offset().await
    }

    fn viewport_width(&self) -> u32 {
        self.as_ref().viewport_width()
    }

    fn viewport_height(&self) -> u32 {
        self.as_ref().viewport_height()
    }

    fn document_height(&self) -> u32 {
        self.as_ref().document_height()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.as_ref().device_pixel_ratio()
    }

    fn metrics(&self) -> DriverMetrics {
        self.as_ref().metrics()
    }
}

/// Lightweight driver used for early integration and testing. Frames are
/// opaque white and the scrollable document is whatever the config declares.
pub struct MockViewport {
    config: ViewportConfig,
    scroll: Arc<Mutex<u32>>,
    metrics: Arc<Mutex<DriverMetrics>>,
}

impl MockViewport {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            scroll: Arc::new(Mutex::new(0)),
            metrics: Arc::new(Mutex::new(DriverMetrics::default())),
        }
    }

    fn record_capture(&self, capture_ms: u64) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.frames_captured += 1;
            guard.last_timing = Some(FrameTiming {
                capture_ms,
                captured_at: Utc::now(),
            });
        }
    }
}

#[async_trait]
impl ViewportDriver for MockViewport {
    async fn capture_frame(&self) -> Result<FrameRaster> {
        info!("capturing frame using mock viewport");
        sleep(Duration::from_millis(25)).await;
        let width = scale_by_dpr(self.config.width, self.config.device_pixel_ratio);
        let height = scale_by_dpr(self.config.height, self.config.device_pixel_ratio);
        let data = vec![0xff; (width as usize) * (height as usize) * 4];
        self.record_capture(25);
        Ok(FrameRaster::from_rgba(width, height, data))
    }

    async fn set_scroll_offset(&self, y: u32) -> Result<()> {
        let max = self
            .config
            .document_height
            .saturating_sub(self.config.height);
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
        self.config.width
    }

    fn viewport_height(&self) -> u32 {
        self.config.height
    }

    fn document_height(&self) -> u32 {
        self.config.document_height
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.config.device_pixel_ratio
    }

    fn metrics(&self) -> DriverMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Generate an error aligned with viewport capture semantics.
pub fn driver_error(message: impl Into<String>) -> ScrollCapError {
    ScrollCapError::CaptureFailed(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ViewportConfig {
        ViewportConfig {
            width: 640,
            height: 480,
            document_height: 2000,
            device_pixel_ratio: 1.0,
        }
    }

    #[tokio::test]
    async fn mock_returns_viewport_sized_frames() {
        let driver = MockViewport::new(config());
        let frame = driver.capture_frame().await.expect("capture");
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert!(frame.is_well_formed());
        assert_eq!(driver.metrics().frames_captured, 1);
    }

    #[tokio::test]
    async fn mock_clamps_scroll_to_document_end() {
        let driver = MockViewport::new(config());
        driver.set_scroll_offset(10_000).await.expect("scroll");
        assert_eq!(driver.scroll_offset().await.expect("offset"), 2000 - 480);
    }
}

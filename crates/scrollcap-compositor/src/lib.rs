//! Frame compositing: assembles ordered viewport captures into one seamless
//! raster.
//!
//! All coordinate math happens in document-pixel space; device-pixel-ratio
//! scaling is applied uniformly to the destination canvas and to every draw,
//! so high-density output stays sharp and aligned.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use image::{imageops, GenericImage, ImageBuffer, Rgba, RgbaImage};
use scrollcap_types::{
    capture::{CaptureSession, CapturedFrame, CompositeImage},
    geometry::scale_by_dpr,
    Result, ScrollCapError,
};
use tracing::{debug, info};

/// Stitches a session's frames into a single composite, cropped to the
/// selection's width and the captured vertical extent.
///
/// Overlap policy: a frame whose captured viewport extends past the document
/// end (the scroll position was clamped) contributes only its trailing strip,
/// cropped on the source side, so previously drawn rows are never
/// overwritten. Pure function; stitching the same session twice yields
/// pixel-identical output.
pub fn stitch(session: &CaptureSession) -> Result<CompositeImage> {
    if session.frames.is_empty() {
        return Err(ScrollCapError::EmptySession);
    }

    let dpr = session.device_pixel_ratio;
    let out_width = scale_by_dpr(session.selection.width, dpr);
    let out_height = scale_by_dpr(session.total_capture_height, dpr);
    if out_width == 0 || out_height == 0 {
        return Err(ScrollCapError::InvalidState(
            "selection has no area to stitch".into(),
        ));
    }

    let mut canvas = RgbaImage::new(out_width, out_height);
    for frame in &session.frames {
        draw_frame(&mut canvas, session, frame)?;
    }

    info!(
        frames = session.frames.len(),
        width = session.selection.width,
        height = session.total_capture_height,
        dpr,
        "stitched composite"
    );

    Ok(CompositeImage {
        width: session.selection.width,
        height: session.total_capture_height,
        device_pixel_ratio: dpr,
        pixel_width: out_width,
        pixel_height: out_height,
        data: canvas.into_raw(),
    })
}

fn draw_frame(
    canvas: &mut RgbaImage,
    session: &CaptureSession,
    frame: &CapturedFrame,
) -> Result<()> {
    let dpr = session.device_pixel_ratio;
    let raster: RgbaImage = ImageBuffer::from_raw(
        frame.raster.width,
        frame.raster.height,
        frame.raster.data.clone(),
    )
    .ok_or_else(|| {
        ScrollCapError::InvalidState("frame raster buffer does not match its dimensions".into())
    })?;

    let dest_y = frame.document_position.y;
    if dest_y >= session.total_capture_height {
        return Ok(());
    }

    // The scroll position clamps at the document end, so the frame's content
    // may begin above the offset the orchestrator requested. The difference
    // is the source-side crop that keeps the seam free of duplicated rows.
    let frame_doc_height = (raster.height() as f64 / dpr as f64).round() as u32;
    let content_start = dest_y.min(session.document_height.saturating_sub(frame_doc_height));
    let src_y_doc = dest_y - content_start;
    if src_y_doc >= frame_doc_height {
        return Ok(());
    }
    let contribution =
        (frame_doc_height - src_y_doc).min(session.total_capture_height - dest_y);

    let src_x = scale_by_dpr(session.selection.x, dpr);
    if src_x >= raster.width() {
        return Ok(());
    }
    let copy_width = canvas.width().min(raster.width() - src_x);
    let src_y = scale_by_dpr(src_y_doc, dpr).min(raster.height());
    let dest_y_px = scale_by_dpr(dest_y, dpr);
    let copy_height = scale_by_dpr(contribution, dpr)
        .min(raster.height() - src_y)
        .min(canvas.height() - dest_y_px);
    if copy_width == 0 || copy_height == 0 {
        return Ok(());
    }

    debug!(
        dest_y,
        src_y_doc, contribution, "drawing frame contribution"
    );

    let strip = imageops::crop_imm(&raster, src_x, src_y, copy_width, copy_height).to_image();
    canvas.copy_from(&strip, 0, dest_y_px).map_err(|err| {
        ScrollCapError::InvalidState(format!("frame does not fit the composite canvas: {err}"))
    })
}

/// Dumps a session's raw frames as PNGs for debugging, one file per frame.
pub fn persist_frames(session: &CaptureSession, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .map_err(|err| ScrollCapError::Ops(format!("failed to create frame dir {dir:?}: {err}")))?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");

    let mut paths = Vec::with_capacity(session.frames.len());
    for (index, frame) in session.frames.iter().enumerate() {
        let path = dir.join(format!("frame_{timestamp}_{index:03}.png"));
        let Some(buffer) = ImageBuffer::<Rgba<u8>, _>::from_raw(
            frame.raster.width,
            frame.raster.height,
            frame.raster.data.clone(),
        ) else {
            return Err(ScrollCapError::InvalidState(
                "frame raster buffer does not match its dimensions".into(),
            ));
        };
        buffer
            .save(&path)
            .map_err(|err| ScrollCapError::Ops(format!("failed to persist frame: {err}")))?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollcap_types::capture::FrameRaster;
    use scrollcap_types::geometry::{DocPoint, SelectionRect};

    /// Raster whose pixels encode their document position the same way
    /// `SyntheticPage::gradient` does: red = y % 256, green = y / 256,
    /// blue = x % 256.
    fn gradient_raster(width: u32, first_row: u32, height: u32, dpr: f32) -> FrameRaster {
        let px_width = scale_by_dpr(width, dpr);
        let px_height = scale_by_dpr(height, dpr);
        let img = RgbaImage::from_fn(px_width, px_height, |px, py| {
            let x = (px as f64 / dpr as f64) as u32;
            let y = first_row + (py as f64 / dpr as f64) as u32;
            Rgba([(y % 256) as u8, (y / 256 % 256) as u8, (x % 256) as u8, 0xff])
        });
        FrameRaster::from_rgba(px_width, px_height, img.into_raw())
    }

    fn frame(width: u32, requested_y: u32, content_start: u32, height: u32, dpr: f32) -> CapturedFrame {
        CapturedFrame {
            raster: gradient_raster(width, content_start, height, dpr),
            document_position: DocPoint::new(0, requested_y),
            viewport_height: height,
        }
    }

    /// Selection 800x2500 over a 2500-tall document with a 1000-tall
    /// viewport: three frames, the last one captured with its scroll clamped
    /// to 1500, contributing only its final 500 rows.
    fn three_frame_session() -> CaptureSession {
        let mut session =
            CaptureSession::new(SelectionRect::new(0, 0, 800, 2500), 2500, 2500, 1.0);
        session.push_frame(frame(800, 0, 0, 1000, 1.0));
        session.push_frame(frame(800, 1000, 1000, 1000, 1.0));
        session.push_frame(frame(800, 2000, 1500, 1000, 1.0));
        session
    }

    fn pixel(composite: &CompositeImage, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize * composite.pixel_width as usize) + x as usize) * 4;
        composite.data[idx..idx + 4].try_into().unwrap()
    }

    #[test]
    fn composite_covers_every_row_exactly_once() {
        let composite = stitch(&three_frame_session()).expect("stitch");
        assert_eq!(composite.width, 800);
        assert_eq!(composite.height, 2500);
        assert_eq!(composite.pixel_width, 800);
        assert_eq!(composite.pixel_height, 2500);

        // Rows around each seam plus both ends must carry their own
        // document-space color; any duplication or gap would shift them.
        for y in [0u32, 999, 1000, 1999, 2000, 2200, 2499] {
            let got = pixel(&composite, 0, y);
            assert_eq!(
                got[0],
                (y % 256) as u8,
                "red channel mismatch at row {y}"
            );
            assert_eq!(
                got[1],
                (y / 256 % 256) as u8,
                "green channel mismatch at row {y}"
            );
        }
    }

    #[test]
    fn stitch_is_idempotent() {
        let session = three_frame_session();
        let first = stitch(&session).expect("first stitch");
        let second = stitch(&session).expect("second stitch");
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn empty_session_is_rejected() {
        let session = CaptureSession::new(SelectionRect::new(0, 0, 800, 2500), 2500, 2500, 1.0);
        let err = stitch(&session).unwrap_err();
        assert!(matches!(err, ScrollCapError::EmptySession));
    }

    #[test]
    fn device_pixel_ratio_scales_canvas_and_draws() {
        let mut session =
            CaptureSession::new(SelectionRect::new(0, 0, 400, 900), 900, 900, 2.0);
        session.push_frame(frame(400, 0, 0, 500, 2.0));
        session.push_frame(frame(400, 500, 400, 500, 2.0));

        let composite = stitch(&session).expect("stitch");
        assert_eq!(composite.width, 400);
        assert_eq!(composite.height, 900);
        assert_eq!(composite.pixel_width, 800);
        assert_eq!(composite.pixel_height, 1800);

        // Document row 700 lives at physical row 1400.
        let got = pixel(&composite, 0, 1400);
        assert_eq!(got[0], (700 % 256) as u8);
        assert_eq!(got[1], (700 / 256) as u8);
    }

    #[test]
    fn horizontal_band_honors_selection_x() {
        let mut session =
            CaptureSession::new(SelectionRect::new(100, 0, 300, 500), 500, 500, 1.0);
        session.push_frame(frame(800, 0, 0, 500, 1.0));

        let composite = stitch(&session).expect("stitch");
        assert_eq!(composite.pixel_width, 300);
        // Column 0 of the composite is document column 100.
        let got = pixel(&composite, 0, 10);
        assert_eq!(got[2], 100);
        let got = pixel(&composite, 299, 10);
        assert_eq!(got[2], (399 % 256) as u8);
    }

    #[test]
    fn document_shorter_than_viewport_still_stitches() {
        let mut session = CaptureSession::new(SelectionRect::new(0, 0, 200, 600), 600, 600, 1.0);
        // A 1000-tall viewport over a 600-tall document captures 600 rows.
        session.push_frame(CapturedFrame {
            raster: gradient_raster(200, 0, 600, 1.0),
            document_position: DocPoint::new(0, 0),
            viewport_height: 1000,
        });

        let composite = stitch(&session).expect("stitch");
        assert_eq!(composite.height, 600);
        let got = pixel(&composite, 0, 599);
        assert_eq!(got[0], (599 % 256) as u8);
    }

    #[test]
    fn persists_frames_as_pngs() {
        let dir = std::env::temp_dir().join(format!(
            "scrollcap-frames-{}",
            uuid_like_suffix()
        ));
        let session = three_frame_session();
        let paths = persist_frames(&session, &dir).expect("persist");
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.exists());
        }
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    fn uuid_like_suffix() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .subsec_nanos();
        format!("{}-{nanos}", std::process::id())
    }
}

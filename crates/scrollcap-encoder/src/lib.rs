//! Output encoding: serializes a stitched composite into PNG, JPEG, or a
//! single-page PDF, plus the timestamp-derived filename the delivery channel
//! uses.

use chrono::Utc;
use image::{
    codecs::jpeg::JpegEncoder, codecs::png::PngEncoder, ColorType, DynamicImage, ImageBuffer,
    ImageEncoder, RgbaImage,
};
use scrollcap_types::{
    capture::CompositeImage,
    output::{EncodedOutput, OutputFormat, DEFAULT_JPEG_QUALITY},
    Result, ScrollCapError,
};
use tracing::info;

mod pdf;

/// Quality of the JPEG rendition embedded in PDF output.
const PDF_EMBED_QUALITY: f32 = 0.95;

/// Pure transformation from composite to encoded payload. `quality` applies
/// to JPEG only and must lie in `[0, 1]`; PNG is lossless and ignores it.
pub fn encode(
    image: &CompositeImage,
    format: OutputFormat,
    quality: Option<f32>,
) -> Result<EncodedOutput> {
    let raster: RgbaImage =
        ImageBuffer::from_raw(image.pixel_width, image.pixel_height, image.data.clone())
            .ok_or_else(|| {
                ScrollCapError::EncodingFailed(
                    "composite buffer does not match its dimensions".into(),
                )
            })?;

    let bytes = match format {
        OutputFormat::Png => encode_png(&raster)?,
        OutputFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY);
            if !(0.0..=1.0).contains(&quality) {
                return Err(ScrollCapError::UnsupportedQuality(quality));
            }
            encode_jpeg(&raster, quality)?
        }
        OutputFormat::Pdf => {
            let jpeg = encode_jpeg(&raster, PDF_EMBED_QUALITY)?;
            pdf::wrap_single_page(&jpeg, image.pixel_width, image.pixel_height)?
        }
    };

    let output = EncodedOutput {
        bytes,
        mime_type: format.mime_type().to_string(),
        suggested_filename: suggested_filename(format),
    };
    info!(
        format = format.extension(),
        bytes = output.bytes.len(),
        filename = %output.suggested_filename,
        "encoded composite"
    );
    Ok(output)
}

/// Deterministic filename derived from the capture timestamp, with the `:`
/// and `.` of the ISO-8601 form replaced so it is safe on every filesystem:
/// `screenshot-YYYY-MM-DDTHH-mm-ss-sssZ.<ext>`.
pub fn suggested_filename(format: OutputFormat) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    format!("screenshot-{timestamp}.{}", format.extension())
}

fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ColorType::Rgba8,
        )
        .map_err(|err| ScrollCapError::EncodingFailed(format!("png encoding failed: {err}")))?;
    Ok(buf)
}

fn encode_jpeg(raster: &RgbaImage, quality: f32) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
    let mut buf = Vec::new();
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|err| ScrollCapError::EncodingFailed(format!("jpeg encoding failed: {err}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample_composite(width: u32, height: u32) -> CompositeImage {
        let raster = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 0xff])
        });
        CompositeImage {
            width,
            height,
            device_pixel_ratio: 1.0,
            pixel_width: width,
            pixel_height: height,
            data: raster.into_raw(),
        }
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let composite = sample_composite(16, 24);
        let output = encode(&composite, OutputFormat::Png, None).expect("encode");
        assert_eq!(output.mime_type, "image/png");

        let decoded = image::load_from_memory(&output.bytes)
            .expect("decode")
            .to_rgba8();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 24);
        assert_eq!(decoded.as_raw(), &composite.data);
    }

    #[test]
    fn jpeg_rejects_quality_outside_unit_range() {
        let composite = sample_composite(8, 8);
        let err = encode(&composite, OutputFormat::Jpeg, Some(1.5)).unwrap_err();
        assert!(matches!(err, ScrollCapError::UnsupportedQuality(q) if (q - 1.5).abs() < f32::EPSILON));

        let err = encode(&composite, OutputFormat::Jpeg, Some(-0.1)).unwrap_err();
        assert!(matches!(err, ScrollCapError::UnsupportedQuality(_)));
    }

    #[test]
    fn jpeg_encodes_at_default_and_full_quality() {
        let composite = sample_composite(32, 16);
        let default_quality = encode(&composite, OutputFormat::Jpeg, None).expect("default");
        let full_quality = encode(&composite, OutputFormat::Jpeg, Some(1.0)).expect("full");
        assert_eq!(default_quality.mime_type, "image/jpeg");

        let decoded = image::load_from_memory(&full_quality.bytes)
            .expect("decode")
            .to_rgb8();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 16);
    }

    #[test]
    fn pdf_wraps_a_single_jpeg_page() {
        let composite = sample_composite(40, 80);
        let output = encode(&composite, OutputFormat::Pdf, None).expect("encode");
        assert_eq!(output.mime_type, "application/pdf");
        assert!(output.bytes.starts_with(b"%PDF"));
        let haystack = &output.bytes;
        let needle = b"DCTDecode";
        assert!(haystack
            .windows(needle.len())
            .any(|window| window == needle));
    }

    #[test]
    fn filename_is_timestamped_and_extension_tagged() {
        let name = suggested_filename(OutputFormat::Jpeg);
        assert!(name.starts_with("screenshot-"));
        assert!(name.ends_with(".jpeg"));
        // ISO-8601 separators are replaced, so the only '.' left is the
        // extension separator and no ':' survives.
        assert_eq!(name.matches('.').count(), 1);
        assert!(!name.contains(':'));
        let stem = name.trim_end_matches(".jpeg").trim_start_matches("screenshot-");
        assert_eq!(stem.len(), "2026-08-07T12-34-56-789Z".len());
        assert!(stem.ends_with('Z'));
    }
}

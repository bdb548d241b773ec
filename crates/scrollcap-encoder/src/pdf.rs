//! Single-page PDF wrapping for a JPEG-encoded raster.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use scrollcap_types::{Result, ScrollCapError};

/// US Letter width in points; the page height follows the raster's aspect
/// ratio.
const PAGE_WIDTH_PT: f32 = 612.0;

/// Builds a one-page document with the JPEG placed as a DCTDecode image
/// XObject filling the page.
pub(crate) fn wrap_single_page(
    jpeg: &[u8],
    pixel_width: u32,
    pixel_height: u32,
) -> Result<Vec<u8>> {
    if pixel_width == 0 || pixel_height == 0 {
        return Err(ScrollCapError::EncodingFailed(
            "cannot wrap an empty raster into a pdf".into(),
        ));
    }
    let page_height = PAGE_WIDTH_PT * pixel_height as f32 / pixel_width as f32;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => pixel_width as i64,
            "Height" => pixel_height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    PAGE_WIDTH_PT.into(),
                    0f32.into(),
                    0f32.into(),
                    page_height.into(),
                    0f32.into(),
                    0f32.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded_content = content.encode().map_err(|err| {
        ScrollCapError::EncodingFailed(format!("pdf content stream encoding failed: {err}"))
    })?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded_content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH_PT.into(), page_height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|err| {
        ScrollCapError::EncodingFailed(format!("pdf serialization failed: {err}"))
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_rasters() {
        let err = wrap_single_page(&[], 0, 100).unwrap_err();
        assert!(matches!(err, ScrollCapError::EncodingFailed(_)));
    }

    #[test]
    fn page_height_follows_aspect_ratio() {
        let bytes = wrap_single_page(b"\xff\xd8fakejpeg\xff\xd9", 200, 400).expect("wrap");
        assert!(bytes.starts_with(b"%PDF-1.5"));
        // MediaBox height should be twice the page width.
        let rendered = String::from_utf8_lossy(&bytes);
        assert!(rendered.contains("1224"));
    }
}

use serde::{Deserialize, Serialize};

/// Default JPEG quality factor when the caller does not supply one.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Pdf,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Png
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Pdf => "application/pdf",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Final encoded payload plus the metadata a delivery channel needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub suggested_filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_metadata_is_consistent() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpeg");
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::Pdf.extension(), "pdf");
        assert_eq!(OutputFormat::Pdf.mime_type(), "application/pdf");
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("pdf".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert!("webp".parse::<OutputFormat>().is_err());
    }
}

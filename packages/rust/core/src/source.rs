//! Classify and validate uploaded payslip files.

use std::fmt;

use payslip_generation::PageImage;
use payslip_shared::{PayslipError, Result};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Recognised upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Png,
    Jpeg,
    Webp,
}

impl UploadKind {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    fn from_content_type(content_type: &str) -> Result<Option<Self>> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "" | "application/octet-stream" => Ok(None),
            "application/pdf" => Ok(Some(Self::Pdf)),
            "image/png" => Ok(Some(Self::Png)),
            "image/jpeg" | "image/jpg" => Ok(Some(Self::Jpeg)),
            "image/webp" => Ok(Some(Self::Webp)),
            other if other.starts_with("image/") => Err(PayslipError::decode(format!(
                "unsupported image format: {other}"
            ))),
            other => Err(PayslipError::decode(format!("unsupported file type: {other}"))),
        }
    }

    fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    fn signature_matches(self, bytes: &[u8]) -> bool {
        match self {
            Self::Pdf => bytes.starts_with(PDF_SIGNATURE),
            Self::Png => bytes.starts_with(PNG_SIGNATURE),
            Self::Jpeg => bytes.starts_with(JPEG_SIGNATURE),
            Self::Webp => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

/// A validated upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Original file name; used as the indexing source.
    pub name: String,
    pub kind: UploadKind,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// The upload as a page image for the vision extractor.
    ///
    /// PDFs are recognised but not rasterized, so they fail here.
    pub fn page_image(&self) -> Result<PageImage> {
        match self.kind {
            UploadKind::Pdf => Err(PayslipError::decode(format!(
                "{}: PDF rasterization is not supported, upload a PNG, JPEG or WebP page image",
                self.name
            ))),
            kind => Ok(PageImage {
                media_type: kind.media_type().to_string(),
                bytes: self.bytes.clone(),
            }),
        }
    }
}

/// Classify `bytes` by content type (falling back to the file extension)
/// and check the format's signature.
pub fn decode_upload(name: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Result<Upload> {
    if bytes.is_empty() {
        return Err(PayslipError::decode(format!("{name}: empty upload")));
    }

    let declared = match content_type {
        Some(ct) => UploadKind::from_content_type(ct)?,
        None => None,
    };
    let kind = declared
        .or_else(|| UploadKind::from_file_name(name))
        .ok_or_else(|| PayslipError::decode(format!("{name}: unsupported file type")))?;

    if !kind.signature_matches(&bytes) {
        return Err(PayslipError::decode(format!(
            "{name}: content is not a valid {kind} file"
        )));
    }

    Ok(Upload {
        name: name.to_string(),
        kind,
        bytes,
    })
}

use serde::{Deserialize, Serialize};

/// Image formats accepted by the inference API.
pub const IMAGE_TYPES: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Video formats accepted by the inference API.
pub const VIDEO_TYPES: &[&str] = &[
    "mov", "mkv", "mp4", "webm", "flv", "mpeg", "mpg", "wmv", "three_gp",
];

/// Document formats accepted by the inference API.
pub const DOCUMENT_TYPES: &[&str] = &[
    "pdf", "csv", "doc", "docx", "xls", "xlsx", "html", "txt", "md",
];

/// Category and canonical wire format of an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaKind {
    Image { format: String },
    Video { format: String },
    Document { format: String },
}

impl MediaKind {
    pub fn format(&self) -> &str {
        match self {
            Self::Image { format } | Self::Video { format } | Self::Document { format } => format,
        }
    }
}

/// The declared type matched none of the supported sets.
///
/// The rendered message lists every supported type and is shown to users
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Unsupported file type: {filetype}. Supported types are: images ({images}), videos ({videos}), and documents ({documents})",
    images = IMAGE_TYPES.join(", "),
    videos = VIDEO_TYPES.join(", "),
    documents = DOCUMENT_TYPES.join(", ")
)]
pub struct UnsupportedMediaType {
    /// Lower-cased declared type.
    pub filetype: String,
}

impl From<UnsupportedMediaType> for threadloom_common::Error {
    fn from(err: UnsupportedMediaType) -> Self {
        threadloom_common::Error::Media(err.to_string())
    }
}

/// Classify a declared file type, case-insensitively.
///
/// `jpg` is canonicalised to `jpeg`; every other format is returned
/// lower-cased and otherwise unchanged.
pub fn classify(declared_type: &str) -> Result<MediaKind, UnsupportedMediaType> {
    let filetype = declared_type.to_lowercase();

    if IMAGE_TYPES.contains(&filetype.as_str()) {
        let format = if filetype == "jpg" {
            "jpeg".to_string()
        } else {
            filetype
        };
        return Ok(MediaKind::Image { format });
    }
    if VIDEO_TYPES.contains(&filetype.as_str()) {
        return Ok(MediaKind::Video { format: filetype });
    }
    if DOCUMENT_TYPES.contains(&filetype.as_str()) {
        return Ok(MediaKind::Document { format: filetype });
    }

    Err(UnsupportedMediaType { filetype })
}

/// Replace every non-alphanumeric character with `_`.
///
/// Only document blocks carry a name, so this only matters for documents.
pub fn sanitize_document_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

pub mod classify;

pub use classify::{
    DOCUMENT_TYPES, IMAGE_TYPES, MediaKind, UnsupportedMediaType, VIDEO_TYPES, classify,
    sanitize_document_name,
};

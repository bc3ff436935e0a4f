pub mod redaction;
pub mod signature;

pub use redaction::{RedactingWriter, redact_secrets};
pub use signature::{MAX_TIMESTAMP_SKEW_SECS, SignatureError, SlackSignatureVerifier};

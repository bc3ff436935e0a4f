//! Verification of Slack's `X-Slack-Signature` request header.
//!
//! Slack signs `v0:<timestamp>:<raw body>` with HMAC-SHA256 keyed by the
//! app's signing secret and sends the hex digest prefixed with `v0=`.

use ring::hmac;

/// Requests whose timestamp is further than this from local time are rejected.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 60 * 5;

const VERSION: &str = "v0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("request timestamp is not a number")]
    InvalidTimestamp,

    #[error("request timestamp is {age_secs}s away from local time")]
    StaleTimestamp { age_secs: i64 },

    #[error("signature is not a v0 hex digest")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

impl From<SignatureError> for threadloom_common::Error {
    fn from(err: SignatureError) -> Self {
        threadloom_common::Error::Security(err.to_string())
    }
}

pub struct SlackSignatureVerifier {
    key: hmac::Key,
}

impl SlackSignatureVerifier {
    pub fn new(signing_secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, signing_secret.as_bytes()),
        }
    }

    /// Compute the `v0=<hex>` signature for a request.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let tag = hmac::sign(&self.key, &base_string(timestamp, body));
        let mut out = String::with_capacity(VERSION.len() + 1 + tag.as_ref().len() * 2);
        out.push_str(VERSION);
        out.push('=');
        for byte in tag.as_ref() {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Check `signature` against the body and timestamp, using `now_unix` as
    /// the local clock. The digest comparison is constant-time.
    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now_unix: i64,
    ) -> Result<(), SignatureError> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        let age_secs = now_unix - ts;
        if age_secs.abs() > MAX_TIMESTAMP_SKEW_SECS {
            return Err(SignatureError::StaleTimestamp { age_secs });
        }

        let digest = signature
            .strip_prefix("v0=")
            .and_then(decode_hex)
            .ok_or(SignatureError::Malformed)?;

        hmac::verify(&self.key, &base_string(timestamp, body), &digest)
            .map_err(|_| SignatureError::Mismatch)
    }
}

fn base_string(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut base = Vec::with_capacity(VERSION.len() + timestamp.len() + body.len() + 2);
    base.extend_from_slice(VERSION.as_bytes());
    base.push(b':');
    base.extend_from_slice(timestamp.as_bytes());
    base.push(b':');
    base.extend_from_slice(body);
    base
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

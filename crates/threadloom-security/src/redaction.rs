use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink that scrubs credentials before they reach stderr.
pub struct RedactingWriter<W> {
    inner: W,
}

impl RedactingWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            inner: std::io::stderr(),
        }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        self.inner.write_all(redact_secrets(&original).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<std::io::Stderr> {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        Self::stderr()
    }
}

static SECRET_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
          xox[bpae]-[A-Za-z0-9-]{10,}      # Slack bot, user, admin and refresh tokens
        | xapp-[A-Za-z0-9-]{10,}           # Slack app-level tokens
        | ABSK[A-Za-z0-9+/=]{20,}          # Bedrock long-term API keys
        | bedrock-api-key-[A-Za-z0-9+/=]{20,}  # Bedrock short-term API keys
        | (?i:bearer)\s+[A-Za-z0-9._~+/=-]{10,}  # Authorization header values
        ",
    )
    .expect("redaction regex should compile")
});

/// Replace Slack tokens, Bedrock API keys and bearer credentials with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    SECRET_PATTERNS.replace_all(input, "[REDACTED]").into_owned()
}

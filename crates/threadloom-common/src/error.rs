/// Workspace-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("database error: {0}")]
    Database(String),

    /// Attachment classification failure. Displayed verbatim because the text
    /// is shown to end users as-is.
    #[error("{0}")]
    Media(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Message without the subsystem prefix, for replies shown to end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg)
            | Self::Channel(msg)
            | Self::Agent(msg)
            | Self::Database(msg)
            | Self::Media(msg)
            | Self::Security(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Serialization(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

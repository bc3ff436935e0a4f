use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// One inbound unit from the chat platform.
///
/// Events are immutable once received; the pipeline only ever borrows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Author of the message. `None` for system and edit events.
    pub user: Option<UserId>,
    pub text: String,
    /// Platform timestamp token identifying this message.
    pub ts: String,
    /// Timestamp token of the thread parent, when the message is a reply.
    pub thread_ts: Option<String>,
    pub channel: String,
    pub channel_kind: ChannelKind,
    pub files: Vec<FileReference>,
}

impl ChatEvent {
    pub fn message(user: impl Into<UserId>, text: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            text: text.into(),
            ts: ts.into(),
            thread_ts: None,
            channel: String::new(),
            channel_kind: ChannelKind::Channel,
            files: Vec::new(),
        }
    }

    pub fn in_channel(mut self, channel: impl Into<String>, kind: ChannelKind) -> Self {
        self.channel = channel.into();
        self.channel_kind = kind;
        self
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn with_files(mut self, files: Vec<FileReference>) -> Self {
        self.files = files;
        self
    }

    /// Whether `user_id` authored this event.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.user.as_ref().is_some_and(|u| u == user_id)
    }
}

/// Channel classification reported by the platform alongside each message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Direct (instant) message with the bot.
    Im,
    /// Multi-party direct message.
    Mpim,
    #[default]
    Channel,
    Group,
    #[serde(other)]
    Unknown,
}

impl ChannelKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "im" => Self::Im,
            "mpim" => Self::Mpim,
            "channel" => Self::Channel,
            "group" => Self::Group,
            _ => Self::Unknown,
        }
    }
}

/// Attachment metadata. Content is fetched lazily through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Declared type (e.g. `png`, `PDF`). Matched case-insensitively.
    pub filetype: String,
    pub name: String,
    /// Private download locator.
    pub url: String,
}

impl FileReference {
    pub fn new(
        filetype: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            filetype: filetype.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_builder_sets_thread_and_files() {
        let file = FileReference::new("png", "shot.png", "https://files/1");
        let event = ChatEvent::message("U1", "hi", "1.0")
            .in_channel("C1", ChannelKind::Channel)
            .in_thread("0.5")
            .with_files(vec![file.clone()]);

        assert_eq!(event.thread_ts.as_deref(), Some("0.5"));
        assert_eq!(event.channel, "C1");
        assert_eq!(event.files, vec![file]);
        assert!(event.is_from("U1"));
        assert!(!event.is_from("U2"));
    }

    #[test]
    fn channel_kind_parses_platform_values() {
        assert_eq!(ChannelKind::parse("im"), ChannelKind::Im);
        assert_eq!(ChannelKind::parse("group"), ChannelKind::Group);
        assert_eq!(ChannelKind::parse("app_home"), ChannelKind::Unknown);
    }

    #[test]
    fn system_event_has_no_author() {
        let mut event = ChatEvent::message("U1", "edited", "2.0");
        event.user = None;
        assert!(!event.is_from("U1"));
    }
}

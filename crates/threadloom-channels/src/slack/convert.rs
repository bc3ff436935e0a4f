use serde_json::Value;
use threadloom_common::{ChannelKind, ChatEvent, FileReference, UserId};

/// Convert a Slack message object into a [`ChatEvent`].
///
/// Accepts both Events API `event` payloads and the message objects returned
/// by `conversations.replies` (which carry no `channel`; it is left empty).
/// Returns `None` when the object has no `ts`.
pub fn event_from_json(value: &Value) -> Option<ChatEvent> {
    let ts = value.get("ts")?.as_str()?.to_string();
    let str_field = |key: &str| value.get(key).and_then(Value::as_str);

    let files = value
        .get("files")
        .and_then(Value::as_array)
        .map(|files| files.iter().map(file_from_json).collect())
        .unwrap_or_default();

    Some(ChatEvent {
        user: str_field("user").map(UserId::from),
        text: str_field("text").unwrap_or_default().to_string(),
        ts,
        thread_ts: str_field("thread_ts").map(str::to_string),
        channel: str_field("channel").unwrap_or_default().to_string(),
        channel_kind: str_field("channel_type")
            .map(ChannelKind::parse)
            .unwrap_or_default(),
        files,
    })
}

/// Hidden, tombstoned and external files come without a private URL. They
/// are kept with an empty locator so the download fails and gets noted.
fn file_from_json(file: &Value) -> FileReference {
    let url = file
        .get("url_private_download")
        .or_else(|| file.get("url_private"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let filetype = file.get("filetype").and_then(Value::as_str).unwrap_or_default();
    let name = file
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    FileReference::new(filetype, name, url)
}

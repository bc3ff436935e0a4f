pub mod error;
pub mod event;
pub mod types;

pub use error::{Error, Result};
pub use event::{ChannelKind, ChatEvent, FileReference};
pub use types::UserId;

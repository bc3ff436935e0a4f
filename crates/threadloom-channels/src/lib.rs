pub mod router;
pub mod traits;

#[cfg(feature = "slack")]
pub mod slack;

pub use router::{ConversationRouter, RouteKind, RouteOutcome, classify_event};
pub use traits::{ChatTransport, TransportDownloader};

#[cfg(feature = "slack")]
pub use slack::SlackWebClient;

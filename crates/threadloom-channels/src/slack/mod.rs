pub mod api;
pub mod convert;

pub use api::SlackWebClient;
pub use convert::event_from_json;

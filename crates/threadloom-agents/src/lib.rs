pub mod invoker;
pub mod providers;
pub mod reasoning;
pub mod turns;

pub use invoker::{Clock, ModelInvoker, SystemClock};
pub use providers::{
    BedrockConverseProvider, ConverseRequest, ConverseResponse, InferenceProvider, ResponseBlock,
    ThinkingConfig, Usage,
};
pub use turns::{
    AttachmentOutcome, ContentBlock, FileDownloader, Role, Turn, build_thread_turns, build_turn,
};

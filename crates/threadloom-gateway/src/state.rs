use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use threadloom_channels::ConversationRouter;
use threadloom_security::SlackSignatureVerifier;

/// How long an event id is remembered for retry suppression.
pub const EVENT_DEDUPE_TTL: Duration = Duration::from_secs(60 * 10);

/// Pruning only runs once the table grows past this many ids.
const DEDUPE_PRUNE_THRESHOLD: usize = 1024;

/// Shared gateway state.
pub struct AppState {
    pub router: Arc<ConversationRouter>,
    pub verifier: SlackSignatureVerifier,
    /// The bot's own user id; its messages are never routed.
    pub bot_user_id: String,
    seen_events: DashMap<String, Instant>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        router: Arc<ConversationRouter>,
        verifier: SlackSignatureVerifier,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            verifier,
            bot_user_id: bot_user_id.into(),
            seen_events: DashMap::new(),
        }
    }

    /// Record `event_id`; returns `false` when it was already seen recently.
    pub fn first_delivery(&self, event_id: &str) -> bool {
        let now = Instant::now();
        if self.seen_events.len() > DEDUPE_PRUNE_THRESHOLD {
            self.seen_events
                .retain(|_, seen| now.duration_since(*seen) < EVENT_DEDUPE_TTL);
        }
        match self.seen_events.entry(event_id.to_string()) {
            Entry::Occupied(seen) if now.duration_since(*seen.get()) < EVENT_DEDUPE_TTL => false,
            Entry::Occupied(mut seen) => {
                seen.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}

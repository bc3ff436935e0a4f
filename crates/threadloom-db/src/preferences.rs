use std::sync::Arc;

use tracing::{error, warn};

use crate::preference_store::{PreferenceStore, UserPreference};

/// Read/write access to user preferences with degrade-on-failure semantics.
///
/// Reads that fail are logged and reported as "unset" so the caller falls
/// through to its defaults. Writes report success as a boolean; the caller
/// decides how to tell the user. Every write is an atomic read-modify-write
/// of the whole record, so changing the model never drops stored prompts and
/// vice versa.
#[derive(Clone)]
pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Full record for `user_id`, or `None` when unset or unreadable.
    pub fn get(&self, user_id: &str) -> Option<UserPreference> {
        match self.store.load(user_id) {
            Ok(pref) => pref,
            Err(e) => {
                warn!(user_id, "failed to read user preferences: {e}");
                None
            }
        }
    }

    pub fn preferred_model(&self, user_id: &str) -> Option<String> {
        self.get(user_id).and_then(|p| p.model_id)
    }

    pub fn system_prompt(&self, user_id: &str, model_id: &str) -> Option<String> {
        self.get(user_id)
            .and_then(|mut p| p.system_prompts.remove(model_id))
    }

    pub fn set_preferred_model(&self, user_id: &str, model_id: &str) -> bool {
        self.update(user_id, |pref| pref.model_id = Some(model_id.to_string()))
    }

    pub fn set_system_prompt(&self, user_id: &str, model_id: &str, prompt: &str) -> bool {
        self.update(user_id, |pref| {
            pref.system_prompts
                .insert(model_id.to_string(), prompt.to_string());
        })
    }

    fn update<F>(&self, user_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut UserPreference),
    {
        let mut apply = Some(apply);
        let result = self.store.update(user_id, &mut |pref: &mut UserPreference| {
            if let Some(apply) = apply.take() {
                apply(pref);
            }
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(user_id, "failed to update user preferences: {e}");
                false
            }
        }
    }
}

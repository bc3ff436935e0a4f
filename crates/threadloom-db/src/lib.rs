pub mod preference_store;
pub mod preferences;

pub use preference_store::{
    InMemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore, UserPreference,
};
pub use preferences::PreferenceResolver;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use threadloom_common::{Error, Result};
use tracing::{info, warn};

/// Per-user settings record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,

    /// Preferred model identifier, if the user picked one.
    pub model_id: Option<String>,

    /// Custom system prompt per model identifier.
    pub system_prompts: BTreeMap<String, String>,
}

impl UserPreference {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Backend holding one [`UserPreference`] record per user.
///
/// `save` replaces the whole record. Single-field changes go through
/// `update`, which reads, modifies and writes the record as one atomic step
/// so concurrent writers never drop each other's fields.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<UserPreference>>;

    fn save(&self, preference: &UserPreference) -> Result<()>;

    /// Apply `apply` to the stored record (or a fresh one) and persist it.
    /// A failed read aborts without writing.
    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserPreference)) -> Result<()>;
}

/// SQLite-backed preference store.
pub struct SqlitePreferenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening preference store at {}", db_path.display());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS user_preferences (
                    user_id TEXT PRIMARY KEY,
                    model_id TEXT,
                    system_prompts TEXT NOT NULL DEFAULT '{}',
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("preference store lock poisoned".into()))
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn load(&self, user_id: &str) -> Result<Option<UserPreference>> {
        load_row(&*self.lock()?, user_id)
    }

    fn save(&self, preference: &UserPreference) -> Result<()> {
        save_row(&*self.lock()?, preference)
    }

    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserPreference)) -> Result<()> {
        let mut conn = self.lock()?;
        // IMMEDIATE holds the file's write lock from the read to the commit.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let mut pref = load_row(&tx, user_id)?.unwrap_or_else(|| UserPreference::new(user_id));
        apply(&mut pref);
        save_row(&tx, &pref)?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit preferences: {e}")))
    }
}

fn load_row(conn: &Connection, user_id: &str) -> Result<Option<UserPreference>> {
    let row: Option<(Option<String>, String)> = conn
        .query_row(
            "SELECT model_id, system_prompts FROM user_preferences WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load preferences: {e}")))?;

    Ok(row.map(|(model_id, prompts_raw)| UserPreference {
        user_id: user_id.to_string(),
        model_id,
        system_prompts: serde_json::from_str(&prompts_raw).unwrap_or_else(|e| {
            warn!("discarding unreadable system prompts for {user_id}: {e}");
            BTreeMap::new()
        }),
    }))
}

fn save_row(conn: &Connection, preference: &UserPreference) -> Result<()> {
    let prompts = serde_json::to_string(&preference.system_prompts)?;
    conn.execute(
        "INSERT INTO user_preferences (user_id, model_id, system_prompts)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
           model_id = excluded.model_id,
           system_prompts = excluded.system_prompts,
           updated_at = datetime('now')",
        params![preference.user_id, preference.model_id, prompts],
    )
    .map_err(|e| Error::Database(format!("failed to save preferences: {e}")))?;
    Ok(())
}

/// Map-backed store for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryPreferenceStore {
    entries: Mutex<HashMap<String, UserPreference>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn load(&self, user_id: &str) -> Result<Option<UserPreference>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Database("preference store lock poisoned".into()))?;
        Ok(entries.get(user_id).cloned())
    }

    fn save(&self, preference: &UserPreference) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Database("preference store lock poisoned".into()))?;
        entries.insert(preference.user_id.clone(), preference.clone());
        Ok(())
    }

    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserPreference)) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Database("preference store lock poisoned".into()))?;
        let pref = entries
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreference::new(user_id));
        apply(pref);
        Ok(())
    }
}

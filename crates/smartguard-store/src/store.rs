//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use smartguard_types::{DeviceNode, UserSettings};

use crate::error::{Error, Result};
use crate::schema;

/// Key of the persisted login flag.
pub const AUTH_KEY: &str = "smartguard_auth";
/// Key of the persisted [`UserSettings`].
pub const SETTINGS_KEY: &str = "smartguard_settings";
/// Key of the persisted node list.
pub const NODES_KEY: &str = "smartguard_nodes";

/// SQLite-backed key/value store of JSON documents.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Raw values ===

    /// Raw JSON stored under `key`.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store raw JSON under `key`.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        debug!(key, "Stored value");
        Ok(())
    }

    /// Delete `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(n > 0)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    // === Typed values ===

    /// Decode the value under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| Error::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Encode and store `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|source| Error::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &raw)
    }

    /// Decode `key`, falling back to `T::default()` when it is missing or
    /// unreadable.
    fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.get(key) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(Error::Serialization { key, source }) => {
                warn!("Ignoring unreadable value for '{key}': {source}");
                Ok(T::default())
            }
            Err(e) => Err(e),
        }
    }

    // === Application state ===

    /// Whether the user is logged in.
    pub fn is_authenticated(&self) -> Result<bool> {
        self.get_or_default(AUTH_KEY)
    }

    /// Set the login flag.
    pub fn set_authenticated(&self, authenticated: bool) -> Result<()> {
        self.set(AUTH_KEY, &authenticated)
    }

    /// Persisted settings, or defaults.
    pub fn load_settings(&self) -> Result<UserSettings> {
        self.get_or_default(SETTINGS_KEY)
    }

    /// Persist settings.
    pub fn save_settings(&self, settings: &UserSettings) -> Result<()> {
        self.set(SETTINGS_KEY, settings)
    }

    /// Persisted nodes.
    pub fn load_nodes(&self) -> Result<Vec<DeviceNode>> {
        self.get_or_default(NODES_KEY)
    }

    /// Persist nodes.
    pub fn save_nodes(&self, nodes: &[DeviceNode]) -> Result<()> {
        self.set(NODES_KEY, nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartguard_types::{NodeRole, Status, Theme};

    fn node(id: &str) -> DeviceNode {
        DeviceNode {
            id: id.to_string(),
            device_id: Some(format!("DEV-{id}")),
            name: "Boiler".to_string(),
            location: "Basement".to_string(),
            role: NodeRole::Node,
            ppm: 410.0,
            temperature: 21.0,
            humidity: 40.0,
            battery: 90,
            signal: -60,
            status: Status::Safe,
            last_seen: None,
        }
    }

    #[test]
    fn test_defaults_when_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.is_authenticated().unwrap());
        assert_eq!(store.load_settings().unwrap(), UserSettings::default());
        assert!(store.load_nodes().unwrap().is_empty());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_state_round_trip() {
        let store = Store::open_in_memory().unwrap();

        store.set_authenticated(true).unwrap();
        let settings = UserSettings {
            channel_id: "2512345".to_string(),
            theme: Theme::Light,
            ..Default::default()
        };
        store.save_settings(&settings).unwrap();
        store.save_nodes(&[node("a1b2c3d4e")]).unwrap();

        assert!(store.is_authenticated().unwrap());
        assert_eq!(store.load_settings().unwrap(), settings);
        assert_eq!(store.load_nodes().unwrap(), vec![node("a1b2c3d4e")]);
        assert_eq!(store.keys().unwrap(), [AUTH_KEY, NODES_KEY, SETTINGS_KEY]);
    }

    #[test]
    fn test_settings_stored_as_camel_case() {
        let store = Store::open_in_memory().unwrap();
        store.save_settings(&UserSettings::default()).unwrap();
        let raw = store.get_raw(SETTINGS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"warningThreshold\":1000"));
        assert!(raw.contains("\"channelId\":\"0\""));
    }

    #[test]
    fn test_unreadable_values_fall_back() {
        let store = Store::open_in_memory().unwrap();
        store.set_raw(SETTINGS_KEY, "{not json").unwrap();
        store.set_raw(NODES_KEY, "42").unwrap();

        assert_eq!(store.load_settings().unwrap(), UserSettings::default());
        assert!(store.load_nodes().unwrap().is_empty());
        assert!(matches!(
            store.get::<UserSettings>(SETTINGS_KEY),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let store = Store::open_in_memory().unwrap();
        store
            .set_raw(SETTINGS_KEY, r#"{"dangerThreshold": 3000, "demoMode": true}"#)
            .unwrap();
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.danger_threshold, 3000.0);
        assert!(settings.demo_mode);
        assert_eq!(settings.warning_threshold, 1000.0);
    }

    #[test]
    fn test_remove() {
        let store = Store::open_in_memory().unwrap();
        store.set_authenticated(true).unwrap();
        assert!(store.remove(AUTH_KEY).unwrap());
        assert!(!store.remove(AUTH_KEY).unwrap());
        assert!(!store.is_authenticated().unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");

        {
            let store = Store::open(&path).unwrap();
            store.set_authenticated(true).unwrap();
            store.save_nodes(&[node("zz9plural")]).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert!(store.is_authenticated().unwrap());
        assert_eq!(store.load_nodes().unwrap()[0].id, "zz9plural");
    }
}

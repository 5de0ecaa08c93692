//! Local persisted state for SmartGuard.
//!
//! A small SQLite database holding JSON documents by key: the login flag,
//! the user's settings and the list of known nodes. Values are read once at
//! startup and written back on every change.
//!
//! # Example
//!
//! ```no_run
//! use smartguard_store::Store;
//!
//! let store = Store::open_default()?;
//! let mut settings = store.load_settings()?;
//! settings.demo_mode = true;
//! store.save_settings(&settings)?;
//! # Ok::<(), smartguard_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use store::{AUTH_KEY, NODES_KEY, SETTINGS_KEY, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/smartguard/state.db`
/// - macOS: `~/Library/Application Support/smartguard/state.db`
/// - Windows: `C:\Users\<user>\AppData\Local\smartguard\state.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("smartguard")
        .join("state.db")
}

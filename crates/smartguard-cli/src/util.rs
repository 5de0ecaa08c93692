//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use smartguard_store::Store;

/// Open the state database at `db`, or at the default location.
pub fn open_store(db: Option<&Path>) -> Result<Store> {
    let path = match db {
        Some(path) => path.to_path_buf(),
        None => smartguard_store::default_db_path(),
    };
    Store::open(&path).with_context(|| format!("Failed to open database at {}", path.display()))
}

/// Fail unless the user is logged in.
pub fn require_login(store: &Store) -> Result<()> {
    if !store.is_authenticated()? {
        bail!("Not logged in. Run 'smartguard login' first.");
    }
    Ok(())
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{content}");
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Parse an on/off style flag.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => bail!("Expected on or off, got '{other}'"),
    }
}

//! Login, logout and theme commands.

use anyhow::Result;
use smartguard_store::Store;

use crate::style;

pub fn cmd_login(store: &Store, no_color: bool) -> Result<()> {
    if store.is_authenticated()? {
        println!("{}", style::format_info("Already logged in.", no_color));
        return Ok(());
    }
    store.set_authenticated(true)?;
    println!("{}", style::format_success("Logged in.", no_color));
    Ok(())
}

pub fn cmd_logout(store: &Store, no_color: bool) -> Result<()> {
    store.set_authenticated(false)?;
    println!("{}", style::format_success("Logged out.", no_color));
    Ok(())
}

pub fn cmd_theme(store: &Store, no_color: bool) -> Result<()> {
    let mut settings = store.load_settings()?;
    settings.theme = settings.theme.toggled();
    store.save_settings(&settings)?;
    println!(
        "{}",
        style::format_success(&format!("Theme set to {}.", settings.theme), no_color)
    );
    Ok(())
}

//! Path resolution for watchpost
//!
//! # Environment Variables
//!
//! - `WATCHPOST_CONFIG_DIR` - Override config directory (where cookbooks live)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `WATCHPOST_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/watchpost` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\watchpost`
//!    - Linux/macOS: `~/.config/watchpost`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "WATCHPOST_CONFIG_DIR";

const APP_DIR: &str = "watchpost";

/// Get the watchpost config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

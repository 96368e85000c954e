//! Startup env loading for creditagent.
//!
//! Configuration is env-only. Values can come from the process environment,
//! a `./.env` in the working directory, or `~/.creditagent/.env`. dotenvy
//! never overwrites existing vars, so the effective priority is:
//!
//!   explicit env vars > `./.env` > `~/.creditagent/.env`

use std::path::{Path, PathBuf};

/// Path to the service-specific `.env` file: `~/.creditagent/.env`.
pub fn creditagent_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".creditagent")
        .join(".env")
}

/// Load `./.env` and then `~/.creditagent/.env`.
///
/// Returns the files that were actually loaded, for startup logging.
pub fn load_env() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }
    let home = creditagent_env_path();
    if load_env_file(&home) {
        loaded.push(home);
    }
    loaded
}

/// Load one dotenv file if it exists. Missing files are not an error.
pub(crate) fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Warning: failed to load {}: {}", path.display(), e);
            false
        }
    }
}

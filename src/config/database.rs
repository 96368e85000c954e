use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_env_or};
use crate::error::ConfigError;

/// Which store backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    LibSql,
}

impl DatabaseBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "libsql" | "turso" | "sqlite" => Ok(Self::LibSql),
            _ => Err(ConfigError::InvalidValue {
                key: "DATABASE_BACKEND".to_string(),
                message: format!("expected 'postgres' or 'libsql', got '{value}'"),
            }),
        }
    }
}

/// Store connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub pool_size: usize,
    pub libsql_path: PathBuf,
    /// Remote primary for an embedded replica.
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<SecretString>,
}

impl DatabaseConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let url = optional_env("DATABASE_URL")?;
        let backend = match optional_env("DATABASE_BACKEND")? {
            Some(raw) => DatabaseBackend::parse(&raw)?,
            None if url.is_some() => DatabaseBackend::Postgres,
            None => DatabaseBackend::LibSql,
        };

        if backend == DatabaseBackend::Postgres && url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "DATABASE_URL".to_string(),
                hint: "The postgres backend needs a connection URL.".to_string(),
            });
        }

        let libsql_url = optional_env("LIBSQL_URL")?;
        let libsql_auth_token = optional_env("LIBSQL_AUTH_TOKEN")?.map(SecretString::from);
        if libsql_url.is_some() && libsql_auth_token.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "LIBSQL_AUTH_TOKEN".to_string(),
                hint: "A remote replica needs the service credential.".to_string(),
            });
        }

        Ok(Self {
            backend,
            url: url.map(SecretString::from),
            pool_size: parse_env_or("DATABASE_POOL_SIZE", 10usize, "a positive integer")?,
            libsql_path: optional_env("LIBSQL_PATH")?
                .map(PathBuf::from)
                .unwrap_or_else(default_libsql_path),
            libsql_url,
            libsql_auth_token,
        })
    }
}

/// Default embedded database file (~/.creditagent/creditagent.db).
pub fn default_libsql_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".creditagent")
        .join("creditagent.db")
}

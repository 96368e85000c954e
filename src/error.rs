//! Error types for creditagent.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),

    #[error("Agent runtime error: {0}")]
    Agent(#[from] AgentError),

    #[error("Server failed to start: {reason}")]
    Startup { reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

impl DatabaseError {
    /// Whether this error means the row being inserted already exists.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

/// Reasons an inbound interaction request is rejected before any work runs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("missing X-Signature-Ed25519 header")]
    MissingSignature,

    #[error("missing X-Signature-Timestamp header")]
    MissingTimestamp,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("timestamp outside the accepted window ({skew_secs}s skew)")]
    StaleTimestamp { skew_secs: i64 },

    #[error("signature does not match request body")]
    BadSignature,
}

/// Discord HTTP API errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("Discord request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Discord returned HTTP {status} for {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Discord rate limited {operation}, retry after {retry_after:?}")]
    RateLimited {
        operation: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from Discord for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DiscordError {
    /// Transport failures, rate limits, and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } => false,
        }
    }
}

/// Agent runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent runtime request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Agent runtime timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Agent runtime rejected the credential")]
    AuthFailed,

    #[error("Invalid response from agent runtime: {reason}")]
    InvalidResponse { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/custsync";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Sheets / Sync Configuration Constants
// ============================================================================

/// Default range covering the eleven customer columns.
pub const DEFAULT_SHEET_RANGE: &str = "Sheet1!A1:K";

/// Default Google Sheets REST endpoint.
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Default location of the stored OAuth token.
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Default timeout for a single Sheets API request in seconds.
pub const DEFAULT_SHEETS_TIMEOUT_SECS: u64 = 30;

/// Default spacing between two syncs of the same operation class.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Default external request budget per rate window.
pub const DEFAULT_MAX_REQUESTS_PER_WINDOW: u32 = 60;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sheets: SheetsConfig,
    pub sync: SyncConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Google Sheets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Empty is accepted at load time and rejected when a sync needs it
    pub spreadsheet_id: String,
    pub range: String,
    pub api_base_url: String,
    pub token_path: PathBuf,
    pub client_id: String,
    pub redirect_uri: String,
    pub request_timeout_secs: u64,
}

/// Sync gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub rate_window_secs: u64,
    pub max_requests_per_window: u32,
}

impl SyncConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env();
        config.validate()?;

        Ok(config)
    }

    /// Read every section from the environment without validating
    pub fn from_env() -> Self {
        Config {
            server: ServerConfig {
                host: env_string("CUSTSYNC_HOST", DEFAULT_SERVER_HOST),
                port: env_or("CUSTSYNC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "CUSTSYNC_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            sheets: SheetsConfig {
                spreadsheet_id: env_string("GOOGLE_SHEET_ID", ""),
                range: env_string("GOOGLE_SHEET_RANGE", DEFAULT_SHEET_RANGE),
                api_base_url: env_string("GOOGLE_SHEETS_API_BASE", DEFAULT_SHEETS_API_BASE),
                token_path: PathBuf::from(env_string("GOOGLE_TOKEN_PATH", DEFAULT_TOKEN_PATH)),
                client_id: env_string("GOOGLE_CLIENT_ID", ""),
                redirect_uri: env_string("GOOGLE_REDIRECT_URI", ""),
                request_timeout_secs: env_or("GOOGLE_SHEETS_TIMEOUT", DEFAULT_SHEETS_TIMEOUT_SECS),
            },
            sync: SyncConfig {
                rate_window_secs: env_or("SYNC_RATE_WINDOW_SECS", DEFAULT_RATE_WINDOW_SECS),
                max_requests_per_window: env_or(
                    "SYNC_MAX_REQUESTS_PER_WINDOW",
                    DEFAULT_MAX_REQUESTS_PER_WINDOW,
                ),
            },
            cors: CorsConfig {
                allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.rate_window_secs == 0 {
            anyhow::bail!("Sync rate window must be greater than 0 seconds");
        }

        if !self.sheets.range.contains('!') {
            anyhow::bail!(
                "Sheet range '{}' must name a sheet, e.g. Sheet1!A1:K",
                self.sheets.range
            );
        }

        if self.sheets.spreadsheet_id.is_empty() {
            tracing::warn!("GOOGLE_SHEET_ID is not set - sync requests will fail until it is");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            range: DEFAULT_SHEET_RANGE.to_string(),
            api_base_url: DEFAULT_SHEETS_API_BASE.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            client_id: String::new(),
            redirect_uri: String::new(),
            request_timeout_secs: DEFAULT_SHEETS_TIMEOUT_SECS,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
            allow_credentials: true,
        }
    }
}

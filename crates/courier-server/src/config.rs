//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server, which also hosts the
    /// WebSocket endpoint.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.  When unset, the store picks
    /// the platform-appropriate data directory.
    /// Env: `DATABASE_PATH`
    /// Default: none (platform data dir)
    pub database_path: Option<PathBuf>,

    /// JSON file mapping bearer tokens to user identities, consumed by the
    /// auth gate.  When unset, the token table is empty and every
    /// connection attempt is refused.
    /// Env: `AUTH_TOKEN_FILE`
    /// Default: none
    pub auth_token_file: Option<PathBuf>,

    /// Base URL that stored media references are resolved against.
    /// Env: `MEDIA_BASE_URL`
    /// Default: `http://localhost:8080/media`
    pub media_base_url: String,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Courier"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            auth_token_file: None,
            media_base_url: "http://localhost:8080/media".to_string(),
            instance_name: "Courier".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("AUTH_TOKEN_FILE") {
            if !path.is_empty() {
                config.auth_token_file = Some(PathBuf::from(path));
            }
        }

        if let Ok(url) = std::env::var("MEDIA_BASE_URL") {
            config.media_base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

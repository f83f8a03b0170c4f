//! # courier-server
//!
//! Real-time messaging backend for Courier.
//!
//! This binary provides:
//! - **WebSocket sessions** over axum: one task per connection, frames
//!   decoded at the boundary and dispatched to handlers
//! - **Group registry** fanning events out to every live session of a user
//!   or conversation
//! - **Presence tracking** persisted per user and announced to contacts
//! - **SQLite persistence** for messages, contact edges, and status rows

mod api;
mod auth;
mod config;
mod error;
mod media;
mod presence;
mod registry;
mod session;
mod store;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courier_store::Database;

use crate::api::AppState;
use crate::auth::AuthGate;
use crate::config::ServerConfig;
use crate::media::MediaService;
use crate::presence::PresenceTracker;
use crate::registry::GroupRegistry;
use crate::store::ConversationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .init();

    info!("Starting Courier server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    let auth = match &config.auth_token_file {
        Some(path) => AuthGate::from_token_file(path)?,
        None => {
            warn!("AUTH_TOKEN_FILE not set; the token table is empty and every connection will be refused");
            AuthGate::empty()
        }
    };

    let store = ConversationStore::new(database);
    let registry = GroupRegistry::new();
    let presence = PresenceTracker::new(store.clone(), registry.clone());
    let media = MediaService::new(config.media_base_url.clone());

    let http_addr = config.http_addr;
    let state = AppState {
        store,
        registry,
        presence,
        auth: Arc::new(auth),
        media: Arc::new(media),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

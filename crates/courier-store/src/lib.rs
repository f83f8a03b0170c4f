//! # courier-store
//!
//! Durable storage for the Courier messaging backend, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: messages, contact edges, and per-user presence rows.

pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;

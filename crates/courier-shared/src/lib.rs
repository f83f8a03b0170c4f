//! # courier-shared
//!
//! Types shared between the Courier server and its clients: strongly typed
//! identifiers, broadcast group keys, and the JSON wire protocol spoken over
//! the WebSocket connection.

pub mod protocol;
pub mod types;

pub use protocol::{ClientFrame, ServerEvent};
pub use types::{ContactId, GroupKey, MessageId, UserId};

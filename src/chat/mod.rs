//! Near-real-time chat for the community and moderator channels.
//!
//! Incoming messages arrive over a websocket or, when that fails, by polling
//! both channels. Either way they land in a [`ChatLog`], which merges by
//! message id so a message seen twice is kept once.
//!
//! # Architecture
//!
//! - [`ChatLog`]: ordered, de-duplicated message list
//! - [`ChatTransport`]: websocket-then-polling receive loop
//! - [`ChatHandle`]: owner of a running transport; stops it deterministically
//!
//! # Example
//!
//! ```rust
//! use kcd_client::chat::ChatLog;
//!
//! let mut log = ChatLog::new();
//! assert_eq!(log.merge(Vec::new()), 0);
//! assert!(log.is_empty());
//! ```

mod log;
mod transport;

pub use log::{ChatLog, SharedChatLog};
pub use transport::{ChatEvent, ChatHandle, ChatTransport, TransportKind};
pub(crate) use transport::send_message;

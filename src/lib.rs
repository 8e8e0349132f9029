//! KCD Platform client
//!
//! Session, navigation and backend plumbing for the KCD Platform dashboard.
//!
//! # Architecture
//!
//! - **Controller**: screen state machine plus login, profile, workspace,
//!   theme and portfolio operations
//! - **Store**: injectable key/value persistence standing in for browser
//!   local storage
//! - **API base resolution**: override, config, inference and denylist
//!   rules producing the ordered list of backends to try
//! - **Chat**: websocket with a polling fallback, merged by message id
//!
//! # Modules
//!
//! - [`api_base`]: API base normalization and candidate lists
//! - [`chat`]: Chat log and transport
//! - [`client`]: HTTP client for the backend REST surface
//! - [`session`]: Screens, sessions and the controller
//! - [`store`]: Session store trait and implementations
//! - [`theme`]: Theme catalogue and role defaults

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod api_base;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod portfolio;
pub mod session;
pub mod store;
pub mod theme;
pub mod types;

// Re-exports
pub use api_base::ApiBaseResolver;
pub use client::Client;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use session::{Controller, Screen, Session};
pub use store::{FileStore, MemoryStore, SessionStore, StoreKey};
pub use theme::ThemeId;
pub use types::*;

//! Session and navigation management.
//!
//! This module owns the authenticated identity, keeps it consistent with the
//! [`SessionStore`](crate::store::SessionStore), and decides which screen
//! the client shows.
//!
//! # Architecture
//!
//! - [`Screen`]: the navigation state
//! - [`Session`]: authenticated user plus bearer token
//! - [`Controller`]: the state machine and its backend calls
//!
//! # Example
//!
//! ```rust
//! use kcd_client::session::{Screen, can_transition};
//! use kcd_client::config::StartupVariant;
//!
//! assert!(can_transition(Screen::Home, Screen::Login, StartupVariant::Splash));
//! assert!(!can_transition(Screen::Home, Screen::Dashboard, StartupVariant::Splash));
//! ```

mod controller;
mod state;

pub use controller::Controller;
pub use state::{Screen, Session, can_transition, load_session};

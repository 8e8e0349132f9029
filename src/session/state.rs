//! Screens, sessions and their persisted form.

use crate::config::StartupVariant;
use crate::store::{SessionStore, StoreKey, read_clean};
use crate::theme::effective_role;
use crate::types::UserProfile;

/// What the client is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    /// The store has not been read yet.
    Loading,
    Splash,
    Home,
    Login,
    Dashboard,
}

impl Screen {
    pub fn is_authenticated(self) -> bool {
        self == Screen::Dashboard
    }
}

/// Whether the navigation state machine has an edge `from -> to`.
///
/// Leaving `Loading` and entering `Dashboard` happen through
/// [`Controller::load`](super::Controller::load) and login only; this covers
/// user-driven navigation plus logout.
pub fn can_transition(from: Screen, to: Screen, variant: StartupVariant) -> bool {
    match (from, to) {
        (Screen::Splash, Screen::Home) => variant == StartupVariant::Splash,
        (Screen::Splash, Screen::Login) => variant == StartupVariant::DirectLogin,
        (Screen::Home, Screen::Login) | (Screen::Login, Screen::Dashboard) => true,
        (Screen::Dashboard, Screen::Splash) => true,
        (
            Screen::Loading | Screen::Splash | Screen::Home | Screen::Login | Screen::Dashboard,
            _,
        ) => false,
    }
}

/// An authenticated user and their bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    user: UserProfile,
}

impl Session {
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }

    pub fn display_name(&self) -> &str {
        self.user.display_name()
    }

    pub fn role(&self) -> &str {
        &self.user.role
    }

    pub fn subscription_tier(&self) -> Option<&str> {
        self.user.subscription_tier.as_deref()
    }

    pub fn effective_role(&self) -> String {
        effective_role(self.role(), self.subscription_tier())
    }

    pub(crate) fn replace_user(&mut self, user: UserProfile) {
        self.user = user;
    }
}

/// Read the persisted session, treating anything malformed as absent.
pub fn load_session(store: &dyn SessionStore) -> Option<Session> {
    let token = read_clean(store, StoreKey::AccessToken)?;
    let raw_user = read_clean(store, StoreKey::User)?;
    match serde_json::from_str::<UserProfile>(&raw_user) {
        Ok(user) => Some(Session::new(token, user)),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed persisted user");
            None
        }
    }
}

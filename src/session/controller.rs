//! The session and navigation controller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::state::{Screen, Session, can_transition, load_session};
use crate::api_base::ApiBaseResolver;
use crate::chat::{self, ChatEvent, ChatHandle, ChatLog, ChatTransport, SharedChatLog};
use crate::client::Client;
use crate::config::{AppConfig, StartupVariant};
use crate::error::{Error, Result};
use crate::portfolio::validate_upload;
use crate::store::{SessionStore, StoreKey, read_clean};
use crate::theme::{ThemeId, effective_role, resolve_theme};
use crate::types::{Channel, ChatMessage, MediaAsset, UserProfile, Workspace};

#[derive(Debug, Default)]
struct ControllerState {
    session: Option<Session>,
    workspace: Option<Workspace>,
    theme: Option<ThemeId>,
    /// Bumped on logout and dashboard unmount. Responses issued under an
    /// older generation are dropped.
    generation: u64,
}

/// Drives navigation and keeps the session consistent with the store.
///
/// All methods take `&self`; independent fetches may run concurrently and
/// complete in any order.
#[derive(Debug)]
pub struct Controller {
    config: AppConfig,
    store: Arc<dyn SessionStore>,
    client: Client,
    state: Mutex<ControllerState>,
    screen: watch::Sender<Screen>,
    chat_log: SharedChatLog,
    chat: tokio::sync::Mutex<Option<ChatHandle>>,
}

impl Controller {
    /// Create a controller in the [`Screen::Loading`] state.
    pub fn new(config: AppConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let resolver = ApiBaseResolver::new(config.api.clone(), Arc::clone(&store));
        let client = Client::new(resolver)?;
        Ok(Self::with_client(config, store, client))
    }

    pub fn with_client(config: AppConfig, store: Arc<dyn SessionStore>, client: Client) -> Self {
        let (screen, _) = watch::channel(Screen::Loading);
        Self {
            config,
            store,
            client,
            state: Mutex::new(ControllerState::default()),
            screen,
            chat_log: ChatLog::shared(),
            chat: tokio::sync::Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_screen(&self, to: Screen) {
        let from = self.screen.send_replace(to);
        if from != to {
            tracing::info!(from = ?from, to = ?to, "Screen changed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn screen(&self) -> Screen {
        *self.screen.borrow()
    }

    /// Watch screen changes.
    pub fn subscribe(&self) -> watch::Receiver<Screen> {
        self.screen.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn workspace(&self) -> Option<Workspace> {
        self.state().workspace.clone()
    }

    /// Theme currently applied, if one has been resolved.
    pub fn theme(&self) -> Option<ThemeId> {
        self.state().theme
    }

    /// Effective role of the signed-in user, preferring the workspace role.
    pub fn effective_role(&self) -> Option<String> {
        let state = self.state();
        let session = state.session.as_ref()?;
        Some(match &state.workspace {
            Some(ws) => effective_role(
                &ws.role,
                ws.subscription_tier
                    .as_deref()
                    .or_else(|| session.subscription_tier()),
            ),
            None => session.effective_role(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn resolver(&self) -> &ApiBaseResolver {
        self.client.resolver()
    }

    pub fn chat_log(&self) -> SharedChatLog {
        Arc::clone(&self.chat_log)
    }

    /// Token and generation for an authorized call.
    fn authorize(&self) -> Result<(String, u64)> {
        let state = self.state();
        let session = state.session.as_ref().ok_or(Error::NotAuthenticated)?;
        Ok((session.token().to_string(), state.generation))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    /// Read the store and pick the first screen.
    ///
    /// A well-formed persisted session goes straight to the dashboard;
    /// anything else lands on the unauthenticated entry screen.
    pub fn load(&self) -> Screen {
        self.set_screen(Screen::Loading);
        let session = load_session(self.store.as_ref());
        let stored_theme =
            read_clean(self.store.as_ref(), StoreKey::Theme).and_then(|t| ThemeId::parse_lenient(&t));

        let target = match (&session, self.config.session.startup) {
            (Some(_), _) => Screen::Dashboard,
            (None, StartupVariant::Splash) => Screen::Splash,
            (None, StartupVariant::DirectLogin) => Screen::Login,
        };
        {
            let mut state = self.state();
            state.session = session;
            state.workspace = None;
            state.theme = stored_theme;
        }
        self.set_screen(target);
        target
    }

    /// Follow a user-driven navigation edge.
    ///
    /// Entering or leaving the dashboard goes through login and logout.
    pub fn navigate(&self, to: Screen) -> Result<Screen> {
        let from = self.screen();
        if from == Screen::Dashboard
            || to == Screen::Dashboard
            || !can_transition(from, to, self.config.session.startup)
        {
            return Err(Error::InvalidTransition { from, to });
        }
        self.set_screen(to);
        Ok(to)
    }

    /// Splash finished or was skipped.
    pub fn finish_splash(&self) -> Result<Screen> {
        let to = match self.config.session.startup {
            StartupVariant::Splash => Screen::Home,
            StartupVariant::DirectLogin => Screen::Login,
        };
        self.navigate(to)
    }

    /// "Log in" clicked on the home page.
    pub fn open_login(&self) -> Result<Screen> {
        self.navigate(Screen::Login)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Authenticate and move to the dashboard.
    ///
    /// On failure the screen is unchanged. A rejection by the backend is
    /// [`Error::InvalidCredentials`]; an unreachable backend is
    /// [`Error::NetworkError`].
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let from = self.screen();
        if !can_transition(from, Screen::Dashboard, self.config.session.startup) {
            return Err(Error::InvalidTransition {
                from,
                to: Screen::Dashboard,
            });
        }

        let response = self
            .client
            .auth()
            .login(email, password)
            .await
            .map_err(|e| match e {
                Error::Api { message, .. } => Error::InvalidCredentials(message),
                other => other,
            })
            .inspect_err(|e| tracing::warn!(email = %email, error = %e, "Login failed"))?;

        let session = Session::new(response.access_token, response.user);
        self.persist_session(&session)?;
        {
            let mut state = self.state();
            state.session = Some(session.clone());
            state.workspace = None;
        }
        tracing::info!(
            user_id = %session.user_id(),
            role = %session.role(),
            "Logged in"
        );
        self.set_screen(Screen::Dashboard);
        Ok(session)
    }

    /// Log in with the configured demo account.
    pub async fn demo_login(&self) -> Result<Session> {
        let email = self.config.demo.email.clone();
        let password = self.config.demo.password.clone();
        self.login(&email, &password).await
    }

    fn persist_session(&self, session: &Session) -> Result<()> {
        self.store.set(StoreKey::AccessToken, session.token())?;
        self.store
            .set(StoreKey::User, &serde_json::to_string(session.user())?)
    }

    /// Clear the session and return to the splash screen.
    pub async fn logout(&self) {
        self.stop_chat().await;
        for key in [StoreKey::AccessToken, StoreKey::User, StoreKey::Theme] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key = key.as_str(), error = %e, "Failed to clear stored value");
            }
        }
        {
            let mut state = self.state();
            let generation = state.generation + 1;
            *state = ControllerState {
                generation,
                ..ControllerState::default()
            };
        }
        if let Ok(mut log) = self.chat_log.lock() {
            log.clear();
        }
        tracing::info!("Logged out");
        self.set_screen(Screen::Splash);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dashboard data
    // ─────────────────────────────────────────────────────────────────────────

    /// Refresh the cached user. Failures keep the cached value.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let (token, generation) = self.authorize()?;
        let profile = self.client.users(&token).me().await.map_err(|e| {
            tracing::warn!(error = %e, "Profile fetch failed, keeping cached user");
            Error::SoftFetchFailure {
                resource: "profile",
                reason: e.to_string(),
            }
        })?;

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("Discarding stale profile response");
            return Ok(profile);
        }
        if let Some(session) = state.session.as_mut() {
            session.replace_user(profile.clone());
            let json = serde_json::to_string(&profile)?;
            drop(state);
            if let Err(e) = self.store.set(StoreKey::User, &json) {
                tracing::warn!(error = %e, "Failed to persist refreshed user");
            }
        }
        Ok(profile)
    }

    /// Refresh the cached workspace and resolve the theme.
    ///
    /// The theme comes from the stored override, then the workspace, then
    /// the default for the effective role.
    pub async fn fetch_workspace(&self) -> Result<Workspace> {
        let (token, generation) = self.authorize()?;
        let workspace = self.client.workspaces(&token).get().await.map_err(|e| {
            tracing::warn!(error = %e, "Workspace fetch failed, keeping cached workspace");
            Error::SoftFetchFailure {
                resource: "workspace",
                reason: e.to_string(),
            }
        })?;

        let stored_theme = read_clean(self.store.as_ref(), StoreKey::Theme);
        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("Discarding stale workspace response");
            return Ok(workspace);
        }
        let tier = workspace.subscription_tier.clone().or_else(|| {
            state
                .session
                .as_ref()
                .and_then(|s| s.subscription_tier().map(str::to_string))
        });
        let role = effective_role(&workspace.role, tier.as_deref());
        let theme = resolve_theme(stored_theme.as_deref(), Some(&workspace.theme), &role);
        state.theme = Some(theme);
        state.workspace = Some(workspace.clone());
        drop(state);

        tracing::info!(
            effective_role = %role,
            theme = %theme,
            css_class = %theme.css_class(),
            "Workspace loaded"
        );
        Ok(workspace)
    }

    /// Apply a theme locally and push it to the backend in the background.
    ///
    /// The local theme wins immediately; a failed PUT is logged and not
    /// rolled back. Returns the background task when a session exists.
    pub fn set_theme(&self, theme: ThemeId) -> Option<JoinHandle<()>> {
        let token = {
            let mut state = self.state();
            state.theme = Some(theme);
            state.session.as_ref().map(|s| s.token().to_string())
        };
        if let Err(e) = self.store.set(StoreKey::Theme, theme.as_str()) {
            tracing::warn!(error = %e, "Failed to persist theme");
        }
        tracing::info!(theme = %theme, css_class = %theme.css_class(), "Theme applied");

        let token = token?;
        let client = self.client.clone();
        Some(tokio::spawn(async move {
            match client.workspaces(&token).set_theme(theme.as_str()).await {
                Ok(_) => tracing::debug!(theme = %theme, "Theme saved to workspace"),
                Err(e) => tracing::warn!(theme = %theme, error = %e, "Theme update failed"),
            }
        }))
    }

    /// Load dashboard data and start chat.
    ///
    /// Profile and workspace are fetched concurrently; their failures are
    /// soft and only logged.
    pub async fn mount_dashboard(&self) -> Result<()> {
        let from = self.screen();
        if from != Screen::Dashboard {
            return Err(Error::InvalidTransition {
                from,
                to: Screen::Dashboard,
            });
        }
        self.authorize()?;

        let (profile, workspace) = tokio::join!(self.fetch_profile(), self.fetch_workspace());
        if let Err(e) = profile {
            tracing::debug!(error = %e, "Mounted without fresh profile");
        }
        if let Err(e) = workspace {
            tracing::debug!(error = %e, "Mounted without fresh workspace");
        }
        self.start_chat().await?;
        Ok(())
    }

    /// Stop chat and invalidate in-flight responses.
    pub async fn unmount_dashboard(&self) {
        self.stop_chat().await;
        self.state().generation += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────────

    /// (Re)start the chat transport for the current session.
    pub async fn start_chat(&self) -> Result<broadcast::Receiver<ChatEvent>> {
        let (token, _) = self.authorize()?;
        let mut slot = self.chat.lock().await;
        if let Some(old) = slot.take() {
            old.stop().await;
        }
        let transport = ChatTransport::new(
            self.client.clone(),
            token,
            self.config.chat.poll_interval(),
            Arc::clone(&self.chat_log),
        );
        let events = transport.subscribe();
        *slot = Some(transport.start());
        Ok(events)
    }

    pub async fn stop_chat(&self) {
        if let Some(handle) = self.chat.lock().await.take() {
            handle.stop().await;
        }
    }

    pub async fn chat_running(&self) -> bool {
        self.chat
            .lock()
            .await
            .as_ref()
            .is_some_and(ChatHandle::is_running)
    }

    /// Post a message; it appears locally once the server acknowledges it.
    pub async fn send_chat(&self, channel: Channel, content: &str) -> Result<ChatMessage> {
        let (token, _) = self.authorize()?;
        chat::send_message(&self.client, &token, &self.chat_log, channel, content).await
    }

    /// One-shot fetch of a channel, merged into the log.
    pub async fn chat_history(&self, channel: Channel) -> Result<Vec<ChatMessage>> {
        let (token, _) = self.authorize()?;
        let messages = self
            .client
            .chat(&token)
            .messages(channel)
            .await
            .map_err(|e| Error::SoftFetchFailure {
                resource: "chat",
                reason: e.to_string(),
            })?;
        if let Ok(mut log) = self.chat_log.lock() {
            log.merge(messages.iter().cloned());
        }
        Ok(messages)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Portfolio
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn portfolio(&self) -> Result<Vec<MediaAsset>> {
        let (token, _) = self.authorize()?;
        self.client
            .portfolio(&token)
            .list()
            .await
            .map_err(|e| Error::SoftFetchFailure {
                resource: "portfolio",
                reason: e.to_string(),
            })
    }

    /// Upload files one by one. A failed file does not stop the batch.
    pub async fn upload_portfolio(&self, files: &[PathBuf]) -> Result<Vec<Result<MediaAsset>>> {
        let (token, _) = self.authorize()?;
        let api = self.client.portfolio(&token);
        let mut results = Vec::with_capacity(files.len());

        for file in files {
            let outcome = match validate_upload(file) {
                Ok(_) => api.upload(file).await.map_err(|e| match e {
                    Error::UploadFailure { .. } => e,
                    Error::Api { message, .. } => Error::UploadFailure {
                        file: file.clone(),
                        reason: message,
                    },
                    other => Error::UploadFailure {
                        file: file.clone(),
                        reason: other.to_string(),
                    },
                }),
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(asset) => tracing::info!(file = %file.display(), url = %asset.file_url, "Uploaded"),
                Err(e) => tracing::warn!(file = %file.display(), error = %e, "Upload failed"),
            }
            results.push(outcome);
        }
        Ok(results)
    }
}

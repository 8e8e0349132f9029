//! HTTP client for the KCD backend.
//!
//! Every call walks the resolver's candidate bases in order under one shared
//! deadline; the first 2xx response with a decodable JSON body wins.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kcd_client::{ApiBaseResolver, AppConfig, Client, MemoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let resolver = ApiBaseResolver::new(config.api.clone(), Arc::new(MemoryStore::new()));
//! let client = Client::new(resolver)?;
//!
//! let login = client.auth().login("free@kcd-agency.com", "free123").await?;
//! let workspace = client.workspaces(&login.access_token).get().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use reqwest::{RequestBuilder, multipart};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api_base::ApiBaseResolver;
use crate::error::{Error, Result};
use crate::types::*;

/// HTTP client for the API.
#[derive(Debug, Clone)]
pub struct Client {
    resolver: ApiBaseResolver,
    http: reqwest::Client,
    timeout: Duration,
}

/// Why a single candidate did not produce a result.
#[derive(Debug)]
enum Attempt {
    Transport(String),
    Status { status: u16, message: String },
    Body { base: String, reason: String },
}

impl Client {
    /// Create a new client.
    pub fn new(resolver: ApiBaseResolver) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kcd-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(resolver, http))
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(resolver: ApiBaseResolver, http: reqwest::Client) -> Self {
        let timeout = resolver.config().timeout();
        Self {
            resolver,
            http,
            timeout,
        }
    }

    pub fn resolver(&self) -> &ApiBaseResolver {
        &self.resolver
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the Auth API.
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi { client: self }
    }

    /// Access the Users API.
    pub fn users<'a>(&'a self, token: &'a str) -> UsersApi<'a> {
        UsersApi {
            client: self,
            token,
        }
    }

    /// Access the Workspaces API.
    pub fn workspaces<'a>(&'a self, token: &'a str) -> WorkspacesApi<'a> {
        WorkspacesApi {
            client: self,
            token,
        }
    }

    /// Access the Chat API.
    pub fn chat<'a>(&'a self, token: &'a str) -> ChatApi<'a> {
        ChatApi {
            client: self,
            token,
        }
    }

    /// Access the Portfolio API.
    pub fn portfolio<'a>(&'a self, token: &'a str) -> PortfolioApi<'a> {
        PortfolioApi {
            client: self,
            token,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a request built by `build` against each candidate base.
    async fn execute<T, F>(&self, what: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let candidates = self.resolver.candidates();
        if candidates.is_empty() {
            return Err(Error::NetworkError("no usable API base".into()));
        }

        let attempts = async {
            let mut failures = Vec::with_capacity(candidates.len());
            for base in &candidates {
                match Self::attempt(&self.http, base, &build).await {
                    Ok(value) => return Ok(value),
                    Err(failure) => {
                        tracing::debug!(
                            request = what,
                            api_base = %base,
                            failure = ?failure,
                            "Candidate failed"
                        );
                        failures.push(failure);
                    }
                }
            }
            Err(failures)
        };

        match tokio::time::timeout(self.timeout, attempts).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failures)) => Err(Self::classify(failures)),
            Err(_) => Err(Error::NetworkError(format!(
                "{what} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn attempt<T, F>(
        http: &reqwest::Client,
        base: &str,
        build: &F,
    ) -> std::result::Result<T, Attempt>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let response = build(http, base)
            .send()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorDetail>(&body)
                .map(|d| d.message())
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            return Err(Attempt::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| Attempt::Body {
            base: base.to_string(),
            reason: e.to_string(),
        })
    }

    /// A status answer outranks transport noise from other candidates, and
    /// a 404 from a wrong base yields to any other status.
    fn classify(failures: Vec<Attempt>) -> Error {
        let mut network = None;
        let mut answered: Option<(u16, String)> = None;
        for failure in failures {
            match failure {
                Attempt::Status { status, message } => {
                    if answered.as_ref().is_none_or(|(s, _)| *s == 404 && status != 404) {
                        answered = Some((status, message));
                    }
                }
                Attempt::Transport(reason) => network = network.or(Some(reason)),
                Attempt::Body { base, reason } => {
                    network = network
                        .or_else(|| Some(format!("unexpected response from {base}: {reason}")));
                }
            }
        }
        if let Some((status, message)) = answered {
            return Error::Api { status, message };
        }
        Error::NetworkError(network.unwrap_or_else(|| "request failed".into()))
    }

    /// Websocket endpoint on the primary base.
    pub fn chat_ws_url(&self, token: &str) -> Result<Url> {
        let base = self
            .resolver
            .primary()
            .ok_or_else(|| Error::NetworkError("no usable API base".into()))?;
        let mut url = Url::parse(&format!("{base}/v1/chat/ws"))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::Config(format!("cannot derive websocket URL from {base}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

// =============================================================================
// Auth API
// =============================================================================

/// Auth API client.
#[derive(Debug)]
pub struct AuthApi<'a> {
    client: &'a Client,
}

impl AuthApi<'_> {
    /// Exchange credentials for a token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.client
            .execute("login", |http, base| {
                http.post(format!("{base}/v1/auth/login")).json(&req)
            })
            .await
    }
}

// =============================================================================
// Users API
// =============================================================================

/// Users API client.
#[derive(Debug)]
pub struct UsersApi<'a> {
    client: &'a Client,
    token: &'a str,
}

impl UsersApi<'_> {
    /// Current user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        self.client
            .execute("profile", |http, base| {
                http.get(format!("{base}/v1/users/me"))
                    .bearer_auth(self.token)
            })
            .await
    }
}

// =============================================================================
// Workspaces API
// =============================================================================

/// Workspaces API client.
#[derive(Debug)]
pub struct WorkspacesApi<'a> {
    client: &'a Client,
    token: &'a str,
}

impl WorkspacesApi<'_> {
    /// Current user's workspace.
    pub async fn get(&self) -> Result<Workspace> {
        self.client
            .execute("workspace", |http, base| {
                http.get(format!("{base}/v1/workspaces/me"))
                    .bearer_auth(self.token)
            })
            .await
    }

    /// Update the workspace theme.
    pub async fn set_theme(&self, theme: &str) -> Result<Workspace> {
        let req = WorkspaceUpdate {
            theme: theme.to_string(),
        };
        self.client
            .execute("workspace update", |http, base| {
                http.put(format!("{base}/v1/workspaces/me"))
                    .bearer_auth(self.token)
                    .json(&req)
            })
            .await
    }
}

// =============================================================================
// Chat API
// =============================================================================

/// Chat API client.
#[derive(Debug)]
pub struct ChatApi<'a> {
    client: &'a Client,
    token: &'a str,
}

impl ChatApi<'_> {
    /// Messages of one channel, oldest first.
    pub async fn messages(&self, channel: Channel) -> Result<Vec<ChatMessage>> {
        self.client
            .execute("chat messages", |http, base| {
                http.get(format!("{base}/v1/chat/messages"))
                    .query(&[("channel", channel.as_str())])
                    .bearer_auth(self.token)
            })
            .await
    }

    /// Post a message; returns it with its server-assigned id.
    pub async fn send(&self, channel: Channel, content: &str) -> Result<ChatMessage> {
        let req = SendMessageRequest {
            channel,
            content: content.to_string(),
        };
        self.client
            .execute("chat send", |http, base| {
                http.post(format!("{base}/v1/chat/messages"))
                    .bearer_auth(self.token)
                    .json(&req)
            })
            .await
    }
}

// =============================================================================
// Portfolio API
// =============================================================================

/// Portfolio API client.
#[derive(Debug)]
pub struct PortfolioApi<'a> {
    client: &'a Client,
    token: &'a str,
}

impl PortfolioApi<'_> {
    /// Uploaded assets, newest first.
    pub async fn list(&self) -> Result<Vec<MediaAsset>> {
        self.client
            .execute("portfolio", |http, base| {
                http.get(format!("{base}/v1/portfolio/me"))
                    .bearer_auth(self.token)
            })
            .await
    }

    /// Upload one file as multipart field `file`.
    pub async fn upload(&self, path: &Path) -> Result<MediaAsset> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::UploadFailure {
                file: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        self.client
            .execute("portfolio upload", |http, base| {
                let part = multipart::Part::bytes(data.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime.essence_str())
                    .unwrap_or_else(|_| multipart::Part::bytes(data.clone()));
                http.post(format!("{base}/v1/portfolio/upload"))
                    .bearer_auth(self.token)
                    .multipart(multipart::Form::new().part("file", part))
            })
            .await
    }
}

//! API base resolution.
//!
//! Works out which backend origin the client talks to. Sources are tried in
//! priority order:
//!
//! 1. developer override persisted in the [`SessionStore`]
//! 2. configured base URL
//! 3. inference from the frontend origin (`kcd-frontend*` pairs with the
//!    hosted backend)
//! 4. `/api` on the frontend origin
//!
//! Every source is normalized to an `.../api` root and checked against the
//! denylist on every read; a stored override that became denylisted is
//! dropped from the store.

use std::sync::Arc;

use url::Url;

use crate::config::{ApiConfig, ResolveMode};
use crate::error::{Error, Result};
use crate::store::{SessionStore, StoreKey, read_clean};

/// Hosted backend paired with the hosted frontend.
pub const DEFAULT_HOSTED_BACKEND: &str = "https://kcd-backend-xeak.onrender.com";

/// Frontend hostname fragment that implies [`DEFAULT_HOSTED_BACKEND`].
const HOSTED_FRONTEND_MARKER: &str = "kcd-frontend";

/// Upper bound on bases tried per request.
pub const MAX_CANDIDATES: usize = 4;

/// Normalize a base URL to its `/api` root.
///
/// Trailing slashes are stripped and a trailing `/api/v1` or `/v1` collapses
/// to `/api`, since every call appends its own `/v1/...` path.
pub fn normalize_base(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/api".to_string();
    }
    if let Some(root) = trimmed.strip_suffix("/api/v1") {
        return format!("{root}/api");
    }
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.ends_with("/api") || trimmed == "/api" {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api")
    }
}

/// Backend paired with a known frontend origin, if any.
pub fn infer_from_origin(origin: &str) -> Option<String> {
    let host = host_of(origin)?;
    host.contains(HOSTED_FRONTEND_MARKER)
        .then(|| normalize_base(DEFAULT_HOSTED_BACKEND))
}

/// Make a relative base absolute against the frontend origin.
pub fn absolutize(base: &str, origin: &str) -> String {
    if base.starts_with('/') {
        format!("{}{base}", origin.trim_end_matches('/'))
    } else {
        base.to_string()
    }
}

/// Lowercased host of an absolute URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// True when the URL's host is, or is a subdomain of, a denylisted host.
pub fn is_denied(url: &str, denylist: &[String]) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    denylist.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        !entry.is_empty() && (host == entry || host.ends_with(&format!(".{entry}")))
    })
}

/// True for an absolute `http`/`https` URL with a host.
pub fn is_http_url(url: &str) -> bool {
    Url::parse(url)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// Usable as a base: absolute http(s) and not denylisted.
fn is_usable(url: &str, denylist: &[String]) -> bool {
    is_http_url(url) && !is_denied(url, denylist)
}

/// The other spelling of a base: `.../api` pairs with the bare origin.
fn sibling(base: &str) -> String {
    match base.strip_suffix("/api") {
        Some(bare) if !bare.is_empty() => bare.to_string(),
        _ => format!("{base}/api"),
    }
}

/// Primary base for the given override and configuration, skipping any
/// denylisted source. `None` only if every source is denylisted.
pub fn resolve_primary(stored_override: Option<&str>, cfg: &ApiConfig) -> Option<String> {
    let origin = cfg.frontend_origin.as_str();
    let sources = [
        stored_override.map(normalize_base),
        cfg.base_url.as_deref().map(normalize_base),
        infer_from_origin(origin),
        Some("/api".to_string()),
    ];
    sources
        .into_iter()
        .flatten()
        .map(|base| absolutize(&base, origin))
        .find(|base| is_usable(base, &cfg.denylist))
}

/// Ordered, de-duplicated, denylist-filtered bases to try.
pub fn candidate_list(primary: Option<&str>, cfg: &ApiConfig) -> Vec<String> {
    let Some(primary) = primary else {
        return Vec::new();
    };
    if cfg.mode == ResolveMode::Locked {
        return vec![primary.to_string()];
    }

    let origin = cfg.frontend_origin.as_str();
    let mut out: Vec<String> = Vec::new();
    let ordered = std::iter::once(primary.to_string())
        .chain(std::iter::once(sibling(primary)))
        .chain(
            cfg.fallbacks
                .iter()
                .map(|f| absolutize(&normalize_base(f), origin)),
        );
    for base in ordered {
        if out.len() >= MAX_CANDIDATES {
            break;
        }
        if is_usable(&base, &cfg.denylist) && !out.contains(&base) {
            out.push(base);
        }
    }
    out
}

/// Stateful resolver that re-validates the stored override on every read.
#[derive(Debug, Clone)]
pub struct ApiBaseResolver {
    config: ApiConfig,
    store: Arc<dyn SessionStore>,
}

impl ApiBaseResolver {
    pub fn new(config: ApiConfig, store: Arc<dyn SessionStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The stored override, if present, absolute and not denylisted.
    ///
    /// An override failing either check is removed from the store.
    pub fn stored_override(&self) -> Option<String> {
        let raw = read_clean(self.store.as_ref(), StoreKey::ApiBaseOverride)?;
        let normalized = absolutize(&normalize_base(&raw), &self.config.frontend_origin);
        let reason = if !is_http_url(&normalized) {
            Some("not an absolute http(s) URL")
        } else if is_denied(&normalized, &self.config.denylist) {
            Some("denylisted host")
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::warn!(
                override_url = %raw,
                reason,
                "Dropping API base override"
            );
            if let Err(e) = self.store.remove(StoreKey::ApiBaseOverride) {
                tracing::warn!(error = %e, "Failed to remove API base override");
            }
            return None;
        }
        Some(raw)
    }

    /// Primary base.
    pub fn primary(&self) -> Option<String> {
        resolve_primary(self.stored_override().as_deref(), &self.config)
    }

    /// Bases to try for one request, in order.
    pub fn candidates(&self) -> Vec<String> {
        candidate_list(self.primary().as_deref(), &self.config)
    }

    /// Persist a developer override.
    pub fn set_override(&self, url: &str) -> Result<()> {
        let normalized = absolutize(&normalize_base(url), &self.config.frontend_origin);
        if is_denied(&normalized, &self.config.denylist) {
            return Err(Error::DeniedHost(host_of(&normalized).unwrap_or_default()));
        }
        Url::parse(&normalized)?;
        if !is_http_url(&normalized) {
            return Err(Error::InvalidInput(format!(
                "API base must be an absolute http(s) URL: {}",
                url.trim()
            )));
        }
        self.store.set(StoreKey::ApiBaseOverride, url.trim())?;
        tracing::info!(api_base = %normalized, "API base override set");
        Ok(())
    }

    pub fn clear_override(&self) -> Result<()> {
        self.store.remove(StoreKey::ApiBaseOverride)
    }
}

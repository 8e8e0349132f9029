//! Theme catalogue and role-based defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A selectable dashboard theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeId {
    Netflix,
    Disney,
    GooglePlay,
    Salesforce,
}

/// Display metadata for a theme.
#[derive(Debug, Clone, Copy)]
pub struct ThemeInfo {
    pub id: ThemeId,
    pub label: &'static str,
    pub description: &'static str,
}

pub const THEMES: [ThemeInfo; 4] = [
    ThemeInfo {
        id: ThemeId::Netflix,
        label: "Netflix",
        description: "Dark cinematic experience",
    },
    ThemeInfo {
        id: ThemeId::Disney,
        label: "Disney+",
        description: "Family-friendly blue glow",
    },
    ThemeInfo {
        id: ThemeId::GooglePlay,
        label: "Google Play",
        description: "Clean and vibrant",
    },
    ThemeInfo {
        id: ThemeId::Salesforce,
        label: "Salesforce",
        description: "Enterprise cloud style",
    },
];

impl ThemeId {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeId::Netflix => "netflix",
            ThemeId::Disney => "disney",
            ThemeId::GooglePlay => "google-play",
            ThemeId::Salesforce => "salesforce",
        }
    }

    /// CSS class the web client toggles on `<body>`.
    pub fn css_class(self) -> String {
        format!("theme-{}", self.as_str())
    }

    pub fn info(self) -> ThemeInfo {
        // THEMES is indexed in declaration order.
        THEMES[self as usize]
    }

    /// Parse a stored or backend-provided theme, ignoring unknown values.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        THEMES
            .iter()
            .map(|t| t.id)
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown theme: {s}"))
    }
}

/// Role used for theming and feature gating.
///
/// The generic `user` role is replaced by the subscription tier (`free` when
/// unset); every other role stands for itself.
pub fn effective_role(role: &str, subscription_tier: Option<&str>) -> String {
    if role == "user" {
        subscription_tier
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("free")
            .to_string()
    } else {
        role.to_string()
    }
}

/// Default theme for an effective role.
pub fn default_theme_for(effective_role: &str) -> ThemeId {
    match effective_role {
        "admin" | "community_admin" | "brand" => ThemeId::Salesforce,
        "moderator" => ThemeId::GooglePlay,
        "premium" | "vip" => ThemeId::Netflix,
        _ => ThemeId::Disney,
    }
}

/// Theme to show: a valid local override wins, then a valid workspace
/// theme, then the role default.
pub fn resolve_theme(
    local_override: Option<&str>,
    workspace_theme: Option<&str>,
    effective_role: &str,
) -> ThemeId {
    local_override
        .and_then(ThemeId::parse_lenient)
        .or_else(|| workspace_theme.and_then(ThemeId::parse_lenient))
        .unwrap_or_else(|| default_theme_for(effective_role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_role_maps_to_tier() {
        assert_eq!(effective_role("user", Some("premium")), "premium");
        assert_eq!(effective_role("user", None), "free");
        assert_eq!(effective_role("user", Some("")), "free");
        assert_eq!(effective_role("moderator", Some("premium")), "moderator");
    }

    #[test]
    fn premium_defaults_to_premium_theme() {
        let role = effective_role("user", Some("premium"));
        assert_eq!(resolve_theme(None, None, &role), ThemeId::Netflix);
        assert_eq!(resolve_theme(None, Some("dark"), &role), ThemeId::Netflix);
    }

    #[test]
    fn override_beats_workspace_beats_role() {
        assert_eq!(
            resolve_theme(Some("salesforce"), Some("disney"), "premium"),
            ThemeId::Salesforce
        );
        assert_eq!(
            resolve_theme(Some("bogus"), Some("disney"), "premium"),
            ThemeId::Disney
        );
    }

    #[test]
    fn info_table_matches_ids() {
        for info in THEMES {
            assert_eq!(info.id.info().id, info.id);
            assert_eq!(info.id.as_str().parse::<ThemeId>().unwrap(), info.id);
        }
        assert_eq!(ThemeId::GooglePlay.css_class(), "theme-google-play");
    }
}

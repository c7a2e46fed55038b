use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the webapp renders the GitHub sidebar buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebarButtons {
    #[default]
    Team,
    Left,
    Right,
}

impl SidebarButtons {
    pub fn as_str(&self) -> &'static str {
        match self {
            SidebarButtons::Team => "team",
            SidebarButtons::Left => "left",
            SidebarButtons::Right => "right",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "team" => Some(SidebarButtons::Team),
            "left" => Some(SidebarButtons::Left),
            "right" => Some(SidebarButtons::Right),
            _ => None,
        }
    }
}

impl fmt::Display for SidebarButtons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub sidebar_buttons: SidebarButtons,
    pub daily_reminder: bool,
    pub notifications: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            sidebar_buttons: SidebarButtons::Team,
            daily_reminder: true,
            notifications: true,
        }
    }
}

/// OAuth credential issued by GitHub for one linked account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl OAuthToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".into(),
            scope: String::new(),
        }
    }
}

// Never print the secret itself.
impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A chat user linked to a GitHub account.
///
/// Created when the OAuth handshake completes; updated by settings changes
/// and by the daily reminder scan. Only an explicit disconnect removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub user_id: String,
    pub token: OAuthToken,
    pub github_username: String,
    /// Milliseconds since the epoch of the last reminder post.
    pub last_todo_post_at: i64,
    pub settings: UserSettings,
    pub allowed_private_repos: bool,
    pub token_reset_done: bool,
}

impl LinkedIdentity {
    pub fn new(
        user_id: impl Into<String>,
        token: OAuthToken,
        github_username: impl Into<String>,
        allowed_private_repos: bool,
        now_ms: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            token,
            github_username: github_username.into(),
            last_todo_post_at: now_ms,
            settings: UserSettings::default(),
            allowed_private_repos,
            token_reset_done: true,
        }
    }
}

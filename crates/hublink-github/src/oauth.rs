//! GitHub OAuth web flow: authorization URL and code exchange.

use async_trait::async_trait;
use hublink_core::OAuthToken;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::GitHubError;

const PRIVATE_SCOPES: &[&str] = &["repo", "notifications", "read:org"];
const PUBLIC_SCOPES: &[&str] = &["public_repo", "notifications", "read:org"];

/// OAuth app registration plus the endpoints derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Web root with trailing slash, e.g. `https://github.com/`.
    pub base_url: String,
    /// Where GitHub sends the browser back to (`.../oauth/complete`).
    pub redirect_url: String,
}

impl OAuthSettings {
    pub fn scopes(private: bool) -> &'static [&'static str] {
        if private {
            PRIVATE_SCOPES
        } else {
            PUBLIC_SCOPES
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GitHubError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| GitHubError::Config(format!("invalid base URL {}: {e}", self.base_url)))?;
        base.join(path)
            .map_err(|e| GitHubError::Config(format!("invalid OAuth endpoint {path}: {e}")))
    }
}

/// The two halves of the OAuth web flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the user's browser is redirected to, carrying `state`.
    fn authorize_url(
        &self,
        settings: &OAuthSettings,
        state: &str,
        private: bool,
    ) -> Result<String, GitHubError>;

    /// Trade an authorization code for an access token.
    async fn exchange_code(
        &self,
        settings: &OAuthSettings,
        code: &str,
    ) -> Result<OAuthToken, GitHubError>;
}

/// reqwest-backed [`OAuthProvider`] against GitHub's `login/oauth` endpoints.
#[derive(Clone, Default)]
pub struct GitHubOAuth {
    http: reqwest::Client,
}

impl GitHubOAuth {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
impl OAuthProvider for GitHubOAuth {
    fn authorize_url(
        &self,
        settings: &OAuthSettings,
        state: &str,
        private: bool,
    ) -> Result<String, GitHubError> {
        let mut url = settings.endpoint("login/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &settings.client_id)
            .append_pair("redirect_uri", &settings.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &OAuthSettings::scopes(private).join(" "))
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        settings: &OAuthSettings,
        code: &str,
    ) -> Result<OAuthToken, GitHubError> {
        let url = settings.endpoint("login/oauth/access_token")?;
        debug!(%url, "exchanging OAuth code");
        let resp = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", settings.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GitHubError::OAuth(format!(
                "token endpoint returned {}",
                status.as_u16()
            )));
        }
        let body: TokenResponse = resp.json().await?;
        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or_default();
            return Err(GitHubError::OAuth(format!("{error}: {detail}")));
        }
        match body.access_token.filter(|t| !t.is_empty()) {
            Some(access_token) => Ok(OAuthToken {
                access_token,
                token_type: body.token_type,
                scope: body.scope,
            }),
            None => Err(GitHubError::OAuth("server response missing access_token".into())),
        }
    }
}

use std::sync::{Arc, PoisonError, RwLock};

use clap::Args;
use hublink_github::oauth::OAuthSettings;
use hublink_github::{api_base_url, web_base_url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("must have a GitHub OAuth client ID")]
    MissingClientId,

    #[error("must have a GitHub OAuth client secret")]
    MissingClientSecret,

    #[error("must have an encryption key")]
    MissingEncryptionKey,

    #[error("invalid enterprise base URL: {0}")]
    InvalidEnterpriseUrl(String),
}

/// Runtime configuration of the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub github_oauth_client_id: String,
    pub github_oauth_client_secret: String,
    pub encryption_key: String,
    pub github_org: String,
    pub enterprise_base_url: String,
    /// Chat site URL, used for message permalinks.
    pub site_url: String,
    /// Public URL of this service; defaults to `<site_url>/plugins/github`.
    pub plugin_url: String,
    pub enable_private_repo: bool,
    pub connect_to_private_by_default: bool,
    pub enable_left_sidebar: bool,
}

impl Configuration {
    pub fn is_valid(&self) -> Result<(), ConfigError> {
        if self.github_oauth_client_id.trim().is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        if self.github_oauth_client_secret.trim().is_empty() {
            return Err(ConfigError::MissingClientSecret);
        }
        if self.encryption_key.trim().is_empty() {
            return Err(ConfigError::MissingEncryptionKey);
        }
        if let Some(base) = self.enterprise_base() {
            url::Url::parse(base)
                .map_err(|e| ConfigError::InvalidEnterpriseUrl(format!("{base}: {e}")))?;
        }
        Ok(())
    }

    pub fn enterprise_base(&self) -> Option<&str> {
        Some(self.enterprise_base_url.trim()).filter(|s| !s.is_empty())
    }

    pub fn org(&self) -> Option<&str> {
        Some(self.github_org.trim()).filter(|s| !s.is_empty())
    }

    pub fn api_base(&self) -> String {
        api_base_url(self.enterprise_base())
    }

    pub fn public_url(&self) -> String {
        let url = self.plugin_url.trim().trim_end_matches('/');
        if url.is_empty() {
            format!("{}/plugins/github", self.site_url.trim_end_matches('/'))
        } else {
            url.to_string()
        }
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.github_oauth_client_id.clone(),
            client_secret: self.github_oauth_client_secret.clone(),
            base_url: web_base_url(self.enterprise_base()),
            redirect_url: format!("{}/oauth/complete", self.public_url()),
        }
    }

    /// Permalink to a chat post.
    pub fn permalink(&self, post_id: &str) -> String {
        format!("{}/_redirect/pl/{post_id}", self.site_url.trim_end_matches('/'))
    }

    /// The subset of configuration the webapp needs.
    pub fn client_configuration(&self) -> Value {
        json!({ "left_sidebar_enabled": self.enable_left_sidebar })
    }
}

/// Source of the current configuration.
pub trait ConfigService: Send + Sync {
    fn get_configuration(&self) -> Arc<Configuration>;
}

/// Configuration snapshot that can be swapped at runtime.
pub struct SharedConfig {
    current: RwLock<Arc<Configuration>>,
}

impl SharedConfig {
    pub fn new(config: Configuration) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn replace(&self, config: Configuration) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}

impl ConfigService for SharedConfig {
    fn get_configuration(&self) -> Arc<Configuration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Command-line / environment form of [`Configuration`].
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// GitHub OAuth app client ID
    #[arg(long, env = "HUBLINK_GITHUB_CLIENT_ID", default_value = "")]
    pub github_client_id: String,

    /// GitHub OAuth app client secret
    #[arg(long, env = "HUBLINK_GITHUB_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub github_client_secret: String,

    /// Secret used to encrypt stored OAuth tokens
    #[arg(long, env = "HUBLINK_ENCRYPTION_KEY", default_value = "", hide_env_values = true)]
    pub encryption_key: String,

    /// Restrict queries to this GitHub organisation
    #[arg(long, env = "HUBLINK_GITHUB_ORG", default_value = "")]
    pub github_org: String,

    /// GitHub Enterprise base URL (empty for github.com)
    #[arg(long, env = "HUBLINK_ENTERPRISE_BASE_URL", default_value = "")]
    pub enterprise_base_url: String,

    /// Chat site URL
    #[arg(long, env = "HUBLINK_SITE_URL", default_value = "http://localhost:8065")]
    pub site_url: String,

    /// Public URL of this service
    #[arg(long, env = "HUBLINK_PLUGIN_URL", default_value = "")]
    pub plugin_url: String,

    /// Allow connecting with private repository scope
    #[arg(long, env = "HUBLINK_ENABLE_PRIVATE_REPO")]
    pub enable_private_repo: bool,

    /// Request private scope when the user does not choose
    #[arg(long, env = "HUBLINK_CONNECT_PRIVATE_BY_DEFAULT")]
    pub connect_to_private_by_default: bool,

    /// Show the GitHub buttons in the left sidebar
    #[arg(long, env = "HUBLINK_ENABLE_LEFT_SIDEBAR")]
    pub enable_left_sidebar: bool,
}

impl From<ConfigArgs> for Configuration {
    fn from(args: ConfigArgs) -> Self {
        Self {
            github_oauth_client_id: args.github_client_id,
            github_oauth_client_secret: args.github_client_secret,
            encryption_key: args.encryption_key,
            github_org: args.github_org,
            enterprise_base_url: args.enterprise_base_url,
            site_url: args.site_url,
            plugin_url: args.plugin_url,
            enable_private_repo: args.enable_private_repo,
            connect_to_private_by_default: args.connect_to_private_by_default,
            enable_left_sidebar: args.enable_left_sidebar,
        }
    }
}

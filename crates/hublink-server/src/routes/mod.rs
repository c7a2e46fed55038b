pub mod issues;
pub mod oauth;
pub mod repo;
pub mod search;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use aes_gcm::{Aes256Gcm, Key};
use axum::{middleware, Router};
use hublink_github::oauth::OAuthProvider;
use hublink_github::GitHubConnector;
use hublink_store::KvStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::ConfigService;
use crate::crypto::key_from_secret;
use crate::identity::IdentityStore;
use crate::oauth::{OAuthBroker, OAuthStateStore};
use crate::pipeline::{
    attach_context, attach_oauth_context, check_configured, panic_response, require_plugin,
    require_user_json, require_user_plain,
};
use crate::platform::{Messenger, PlatformApi};

/// Deadlines applied by the request pipeline and the OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    /// How long a `connect` waiter listens for its completion.
    pub oauth_wait: Duration,
    pub code_exchange: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            oauth_wait: Duration::from_secs(45),
            code_exchange: Duration::from_secs(120),
        }
    }
}

pub struct InnerAppState {
    pub config: Arc<dyn ConfigService>,
    pub kv: Arc<dyn KvStore>,
    pub oauth_states: OAuthStateStore,
    pub identities: IdentityStore,
    pub broker: Arc<OAuthBroker>,
    pub github: Arc<dyn GitHubConnector>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub messenger: Arc<dyn Messenger>,
    pub platform: Arc<dyn PlatformApi>,
    pub timeouts: Timeouts,
}

impl InnerAppState {
    pub fn new(
        config: Arc<dyn ConfigService>,
        kv: Arc<dyn KvStore>,
        github: Arc<dyn GitHubConnector>,
        oauth: Arc<dyn OAuthProvider>,
        messenger: Arc<dyn Messenger>,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            config,
            oauth_states: OAuthStateStore::new(kv.clone()),
            identities: IdentityStore::new(kv.clone()),
            kv,
            broker: Arc::new(OAuthBroker::new()),
            github,
            oauth,
            messenger,
            platform,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Key for tokens at rest, derived from the current configuration.
    pub fn encryption_key(&self) -> Key<Aes256Gcm> {
        key_from_secret(&self.config.get_configuration().encryption_key)
    }
}

pub type AppState = Arc<InnerAppState>;

pub fn build_router(state: AppState) -> Router {
    let oauth = oauth::routes()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            attach_oauth_context,
        ))
        .route_layer(middleware::from_fn(require_user_plain));

    let anonymous = user::anonymous_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        attach_context,
    ));

    let json = user::json_routes()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            attach_context,
        ))
        .route_layer(middleware::from_fn(require_user_json));

    let plain = Router::new()
        .merge(user::plain_routes())
        .merge(search::routes())
        .merge(repo::routes())
        .merge(issues::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            attach_context,
        ))
        .route_layer(middleware::from_fn(require_user_plain));

    let plugin = user::plugin_routes().route_layer(middleware::from_fn(require_plugin));

    let api = Router::new()
        .merge(anonymous)
        .merge(json)
        .merge(plain)
        .merge(plugin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            check_configured,
        ));

    Router::new()
        .nest("/oauth", oauth)
        .nest("/api/v1", api)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

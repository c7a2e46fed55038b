use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use hublink_core::{HandshakeError, LinkedIdentity};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn, Instrument};

use super::AppState;
use crate::codec::plain;
use crate::config::Configuration;
use crate::oauth::{wait_for_completion, PublishGuard};
use crate::pipeline::RequestContext;

pub const CONNECT_EVENT: &str = "connect";

const COMPLETE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<script>
window.close();
</script>
</head>
<body>
<p>Completed connecting to GitHub. Please close this window.</p>
</body>
</html>
"#;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connect", get(connect))
        .route("/complete", get(complete))
}

/// Lenient boolean query flag: `1`, `t`, `true` in any case.
pub(crate) fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "t" | "true")
    )
}

/// Payload of the `connect` event, also the connected part of `/connected`.
pub(crate) fn connected_payload(config: &Configuration, github_username: &str) -> Value {
    json!({
        "connected": true,
        "github_username": github_username,
        "github_client_id": config.github_oauth_client_id,
        "enterprise_base_url": config.enterprise_base_url,
        "organization": config.github_org,
        "configuration": config.client_configuration(),
    })
}

fn welcome_message(login: &str, html_url: &str) -> String {
    format!(
        "#### Welcome to the GitHub integration!\n\
         You've connected your account to [{login}]({html_url}) on GitHub.\n\n\
         ##### Daily Reminders\n\
         The first time you log in each day you'll get a post here listing unread \
         messages and pull requests awaiting your review.\n\n\
         ##### Notifications\n\
         When someone mentions you, requests your review, or assigns you, you'll get a post here about it."
    )
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    private: Option<String>,
}

async fn connect(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let private = parse_flag(query.private.as_deref());
    let config = state.config.get_configuration();

    let handshake = match state.oauth_states.begin(&ctx.user_id, private).await {
        Ok(handshake) => handshake,
        Err(e) => {
            warn!(error = %e, "failed to store OAuth state");
            return plain(StatusCode::BAD_REQUEST, "error setting stored state");
        }
    };

    let url = match state
        .oauth
        .authorize_url(&config.oauth_settings(), &handshake.token, private)
    {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "failed to build authorization URL");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let subscription = state.broker.subscribe(&ctx.user_id);
    tokio::spawn(
        wait_for_completion(
            state.broker.clone(),
            state.messenger.clone(),
            subscription,
            state.timeouts.oauth_wait,
        )
        .instrument(ctx.span.clone()),
    );

    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompleteQuery {
    code: String,
    state: String,
}

#[derive(Debug, Error)]
enum CompleteError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("Failed to exchange oauth code into token: {0}")]
    Exchange(String),

    #[error("failed to get authenticated GitHub user: {0}")]
    GitHubUser(String),

    #[error("Unable to connect user to GitHub: {0}")]
    Store(String),
}

impl CompleteError {
    fn status(&self) -> StatusCode {
        match self {
            CompleteError::Handshake(HandshakeError::InvalidToken | HandshakeError::WrongUser) => {
                StatusCode::UNAUTHORIZED
            }
            CompleteError::Handshake(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

async fn complete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CompleteQuery>,
) -> Response {
    let mut guard = PublishGuard::new(state.broker.clone(), ctx.user_id.clone());
    match complete_connection(&state, &ctx, &query).await {
        Ok(()) => {
            guard.set(Ok(()));
            Html(COMPLETE_PAGE).into_response()
        }
        Err(e) => {
            warn!(error = %e, "OAuth completion failed");
            guard.set(Err(e.to_string()));
            plain(e.status(), e.to_string())
        }
    }
}

async fn complete_connection(
    state: &AppState,
    ctx: &RequestContext,
    query: &CompleteQuery,
) -> Result<(), CompleteError> {
    if query.code.is_empty() {
        return Err(HandshakeError::MissingCode.into());
    }

    let handshake = state.oauth_states.complete(&query.state).await?;
    handshake.validate(&query.state, &ctx.user_id)?;

    let config = state.config.get_configuration();
    let settings = config.oauth_settings();
    let exchange = state.oauth.exchange_code(&settings, &query.code);
    let token = match tokio::time::timeout(state.timeouts.code_exchange, exchange).await {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => return Err(CompleteError::Exchange(e.to_string())),
        Err(_) => return Err(CompleteError::Exchange("timed out".into())),
    };

    let user = state
        .github
        .connect(&config.api_base(), &token)
        .map_err(|e| CompleteError::GitHubUser(e.to_string()))?
        .current_user()
        .await
        .map_err(|e| CompleteError::GitHubUser(e.to_string()))?;
    ctx.span.record("github_username", user.login.as_str());

    let identity = LinkedIdentity::new(
        handshake.user_id.clone(),
        token,
        user.login.clone(),
        handshake.private_allowed,
        Utc::now().timestamp_millis(),
    );
    state
        .identities
        .store(&identity, &state.encryption_key())
        .await
        .map_err(|e| CompleteError::Store(e.to_string()))?;
    info!(private = handshake.private_allowed, "GitHub account connected");

    if let Err(e) = state
        .identities
        .store_username_mapping(&user.login, &handshake.user_id)
        .await
    {
        warn!(error = %e, "failed to store GitHub username mapping");
    }

    if let Err(e) = state
        .messenger
        .direct_message(
            &handshake.user_id,
            &welcome_message(&user.login, &user.html_url),
            Vec::new(),
        )
        .await
    {
        warn!(error = %e, "failed to send welcome message");
    }

    if let Err(e) = state
        .platform
        .publish_event(
            CONNECT_EVENT,
            connected_payload(&config, &user.login),
            &handshake.user_id,
        )
        .await
    {
        warn!(error = %e, "failed to publish connect event");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::USER_ID_HEADER;
    use crate::test_helpers::{test_app, TestApp};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hublink_github::mock::MockGitHub;
    use hublink_core::HandshakeState;
    use hublink_store::{oauth_state_key, set_json, KvStore};
    use tower::ServiceExt;
    use url::Url;

    async fn get(app: &TestApp, uri: &str, user: &str) -> Response {
        app.router
            .clone()
            .oneshot(
                Request::get(uri)
                    .header(USER_ID_HEADER, user)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn state_param(resp: &Response) -> String {
        let location = resp.headers()[header::LOCATION].to_str().unwrap();
        Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some("TRUE")));
        assert!(parse_flag(Some("1")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(Some("yes")));
        assert!(!parse_flag(None));
    }

    #[tokio::test]
    async fn connect_redirects_and_stores_state() {
        let app = test_app(MockGitHub::new("octo"));
        let resp = get(&app, "/oauth/connect?private=true", "u1").await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let token = state_param(&resp);
        assert_eq!(token.len(), 15);
        assert!(app.kv.exists(&oauth_state_key(&token)).await.unwrap());
        assert_eq!(app.state.broker.subscriber_count("u1"), 1);
    }

    #[tokio::test]
    async fn connect_requires_user() {
        let app = test_app(MockGitHub::new("octo"));
        let resp = get(&app, "/oauth/connect", "").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(text(resp).await.trim(), "Not authorized");
    }

    #[tokio::test]
    async fn complete_without_code_is_400() {
        let app = test_app(MockGitHub::new("octo"));
        let resp = get(&app, "/oauth/complete?state=abc", "u1").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text(resp).await.trim(), "missing authorization code");
    }

    #[tokio::test]
    async fn complete_by_other_user_is_401() {
        let app = test_app(MockGitHub::new("octo"));
        let resp = get(&app, "/oauth/connect", "u1").await;
        let token = state_param(&resp);

        let resp = get(&app, &format!("/oauth/complete?code=C1&state={token}"), "u2").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(text(resp).await.trim(), "not authorized, incorrect user");
        assert!(!app.kv.exists(&oauth_state_key(&token)).await.unwrap());
    }

    #[tokio::test]
    async fn complete_with_mismatched_token_is_401() {
        let app = test_app(MockGitHub::new("octo"));
        // Stored under "T" but recording a different token.
        let record = HandshakeState::new("u1", "other", false);
        set_json(app.kv.as_ref(), &oauth_state_key("T"), &record, None)
            .await
            .unwrap();

        let resp = get(&app, "/oauth/complete?code=C1&state=T", "u1").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(text(resp).await.trim(), "invalid state token");
        assert!(!app.kv.exists(&oauth_state_key("T")).await.unwrap());
        assert!(app
            .state
            .identities
            .get("u1", &app.state.encryption_key())
            .await
            .unwrap()
            .is_none());
        assert!(app.connector.tokens().is_empty());
    }

    #[tokio::test]
    async fn complete_success_links_and_announces() {
        let app = test_app(MockGitHub::new("octo"));
        let resp = get(&app, "/oauth/connect", "u1").await;
        let token = state_param(&resp);

        let resp = get(&app, &format!("/oauth/complete?code=C123&state={token}"), "u1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(text(resp).await.contains("window.close()"));

        let identity = app
            .state
            .identities
            .get("u1", &app.state.encryption_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.github_username, "octo");
        assert_eq!(identity.token.access_token, "token-C123");
        assert!(!identity.allowed_private_repos);
        assert_eq!(
            app.state
                .identities
                .user_for_github_username("octo")
                .await
                .unwrap(),
            Some("u1".to_string())
        );

        let events = app.platform.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, CONNECT_EVENT);
        assert_eq!(events[0].1["github_username"], "octo");
        assert_eq!(events[0].2, "u1");
    }

    #[tokio::test]
    async fn failed_exchange_is_500() {
        let app = test_app(MockGitHub::new("octo"));
        let token = state_param(&get(&app, "/oauth/connect", "u1").await);
        let resp = get(&app, &format!("/oauth/complete?code=bad&state={token}"), "u1").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(resp)
            .await
            .starts_with("Failed to exchange oauth code into token"));
    }

    #[tokio::test]
    async fn failed_user_lookup_is_500() {
        let app = test_app(MockGitHub::new("octo").with_current_user_failure());
        let token = state_param(&get(&app, "/oauth/connect", "u1").await);
        let resp = get(&app, &format!("/oauth/complete?code=C1&state={token}"), "u1").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(resp)
            .await
            .starts_with("failed to get authenticated GitHub user"));
    }
}

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use hublink_core::reminder::{offset_from_header, reminder_due};
use hublink_core::{LinkedIdentity, UserSettings};
use hublink_github::GitHubApi;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppState;
use crate::codec::{plain, write_json, ApiError};
use crate::pipeline::{RequestContext, UserContext};
use crate::todo::{build_todo, has_unreads};

pub const TIMEZONE_OFFSET_HEADER: &str = "X-Timezone-Offset";

const PRIVATE_NOTICE: &str = "Private repositories have been enabled for this plugin. To be able to use them you must disconnect and reconnect your GitHub account. To reconnect your account, use the following slash commands: `/github disconnect` followed by ";

/// Routes that also answer anonymous callers.
pub fn anonymous_routes() -> Router<AppState> {
    Router::new().route("/connected", get(connected))
}

pub fn json_routes() -> Router<AppState> {
    Router::new()
        .route("/user", post(github_user))
        .route("/todo", post(post_todo))
}

pub fn plain_routes() -> Router<AppState> {
    Router::new().route("/settings", post(update_settings))
}

pub fn plugin_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config))
        .route("/token", get(get_token))
}

#[derive(Debug, Serialize)]
struct ConnectedResponse {
    connected: bool,
    github_username: String,
    github_client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    enterprise_base_url: String,
    organization: String,
    user_settings: Option<UserSettings>,
    configuration: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConnectedQuery {
    reminder: String,
}

async fn connected(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ConnectedQuery>,
    headers: HeaderMap,
) -> Response {
    let config = state.config.get_configuration();
    let mut resp = ConnectedResponse {
        connected: false,
        github_username: String::new(),
        github_client_id: String::new(),
        enterprise_base_url: config.enterprise_base_url.clone(),
        organization: config.github_org.clone(),
        user_settings: None,
        configuration: config.client_configuration(),
    };
    if ctx.user_id.is_empty() {
        return write_json(&resp);
    }

    let key = state.encryption_key();
    let mut identity = match state.identities.get(&ctx.user_id, &key).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return write_json(&resp),
        Err(e) => {
            warn!(error = %e, "failed to load linked identity");
            return write_json(&resp);
        }
    };

    resp.connected = true;
    resp.github_username = identity.github_username.clone();
    resp.github_client_id = config.github_oauth_client_id.clone();
    resp.user_settings = Some(identity.settings.clone());

    if identity.settings.daily_reminder && query.reminder == "true" {
        let offset = offset_from_header(
            headers
                .get(TIMEZONE_OFFSET_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let now = Utc::now().timestamp_millis();
        if reminder_due(now, identity.last_todo_post_at, offset) {
            send_reminder(&state, &mut identity, now).await;
        }
    }

    if config.enable_private_repo && !identity.allowed_private_repos {
        send_private_notice(&state, &identity, config.connect_to_private_by_default).await;
    }

    write_json(&resp)
}

async fn send_reminder(state: &AppState, identity: &mut LinkedIdentity, now_ms: i64) {
    let config = state.config.get_configuration();
    let github = match state.github.connect(&config.api_base(), &identity.token) {
        Ok(github) => github,
        Err(e) => {
            warn!(error = %e, "failed to build GitHub client for reminder");
            return;
        }
    };
    match has_unreads(github.as_ref(), &identity.github_username, config.org()).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!(error = %e, "failed to check for unreads");
            return;
        }
    }

    if let Err(e) = send_todo(state, github.as_ref(), identity, config.org()).await {
        warn!(error = %e, "failed to create GitHub todo message");
    }
    identity.last_todo_post_at = now_ms;
    if let Err(e) = state
        .identities
        .store(identity, &state.encryption_key())
        .await
    {
        warn!(error = %e, "failed to store reminder time");
    }
}

async fn send_private_notice(state: &AppState, identity: &LinkedIdentity, private_by_default: bool) {
    match state.identities.private_notice_sent(&identity.user_id).await {
        Ok(false) => {}
        Ok(true) => return,
        Err(e) => {
            warn!(error = %e, "unable to read private repository notice flag");
            return;
        }
    }

    let command = if private_by_default {
        "`/github connect`."
    } else {
        "`/github connect private`."
    };
    let text = format!("{PRIVATE_NOTICE}{command}");
    if let Err(e) = state
        .messenger
        .direct_message(&identity.user_id, &text, Vec::new())
        .await
    {
        warn!(error = %e, "failed to send private repository notice");
    }
    if let Err(e) = state
        .identities
        .mark_private_notice_sent(&identity.user_id)
        .await
    {
        warn!(error = %e, "unable to set private repository notice flag");
    }
}

async fn send_todo(
    state: &AppState,
    github: &dyn GitHubApi,
    identity: &LinkedIdentity,
    org: Option<&str>,
) -> Result<(), ApiError> {
    let text = build_todo(github, &identity.github_username, org).await?;
    state
        .messenger
        .direct_message(&identity.user_id, &text, Vec::new())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("todo message posted");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GitHubUserRequest {
    #[serde(default)]
    user_id: String,
}

async fn github_user(State(state): State<AppState>, body: Bytes) -> Response {
    let req: GitHubUserRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "error decoding GitHubUserRequest");
            return ApiError::BadRequest("Please provide a JSON object.".into()).into_json();
        }
    };
    if req.user_id.is_empty() {
        return ApiError::BadRequest(
            "Please provide a JSON object with a non-blank user_id field.".into(),
        )
        .into_json();
    }

    match state
        .identities
        .get(&req.user_id, &state.encryption_key())
        .await
    {
        Ok(Some(identity)) => write_json(&json!({ "username": identity.github_username })),
        Ok(None) => {
            ApiError::NotFound("User is not connected to a GitHub account.".into()).into_json()
        }
        Err(e) => {
            warn!(error = %e, "failed to load linked identity");
            ApiError::Internal("Unable to get user info.".into()).into_json()
        }
    }
}

async fn post_todo(State(state): State<AppState>, user: UserContext) -> Response {
    let org = user.config.org();
    match send_todo(&state, user.github.as_ref(), &user.identity, org).await {
        Ok(()) => write_json(&json!({ "Status": "OK" })),
        Err(e) => {
            warn!(error = %e, "failed to get todos");
            ApiError::Unauthorized("Encountered an error getting the to do items.".into())
                .into_json()
        }
    }
}

async fn update_settings(State(state): State<AppState>, user: UserContext, body: Bytes) -> Response {
    let settings: UserSettings = match serde_json::from_slice(&body) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "error decoding settings");
            return plain(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let mut identity = user.identity;
    identity.settings = settings;
    if let Err(e) = state
        .identities
        .store(&identity, &state.encryption_key())
        .await
    {
        warn!(error = %e, "failed to store settings");
        return plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Encountered error updating settings",
        );
    }
    write_json(&identity.settings)
}

async fn get_config(State(state): State<AppState>) -> Response {
    write_json(state.config.get_configuration().as_ref())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenQuery {
    #[serde(rename = "userID")]
    user_id: String,
}

async fn get_token(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Response {
    if query.user_id.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "please provide a userID");
    }
    match state
        .identities
        .get(&query.user_id, &state.encryption_key())
        .await
    {
        Ok(Some(identity)) => write_json(&identity.token),
        Ok(None) => ApiError::NotConnected.into_plain(),
        Err(e) => {
            warn!(error = %e, "failed to load linked identity");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Unable to get user info.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PLUGIN_ID_HEADER, USER_ID_HEADER};
    use crate::test_helpers::{link_user, test_app, TestApp};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hublink_github::mock::MockGitHub;
    use hublink_github::models::Issue;
    use hublink_github::queries;
    use tower::ServiceExt;

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, String) {
        let resp = app.router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn connected_request(user: &str, query: &str) -> Request<Body> {
        Request::get(format!("/api/v1/connected{query}"))
            .header(USER_ID_HEADER, user)
            .header(TIMEZONE_OFFSET_HEADER, "0")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn connected_anonymous() {
        let app = test_app(MockGitHub::new("octo"));
        let (status, body) = send(&app, connected_request("", "")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["connected"], false);
        assert!(json.get("enterprise_base_url").is_none());
        assert_eq!(json["configuration"]["left_sidebar_enabled"], false);
    }

    #[tokio::test]
    async fn connected_linked_user() {
        let app = test_app(MockGitHub::new("octo"));
        link_user(&app, "u1", "octo").await;
        let (status, body) = send(&app, connected_request("u1", "")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["connected"], true);
        assert_eq!(json["github_username"], "octo");
        assert_eq!(json["github_client_id"], "client-id");
        assert_eq!(json["user_settings"]["daily_reminder"], true);
    }

    #[tokio::test]
    async fn reminder_posts_todo_once_per_day() {
        let app = test_app(MockGitHub::new("octo").with_search(
            queries::review_requests("octo", None),
            vec![Issue {
                title: "Please review".into(),
                ..Default::default()
            }],
        ));
        let mut identity = link_user(&app, "u1", "octo").await;
        identity.last_todo_post_at = Utc::now().timestamp_millis() - 2 * 24 * 3600 * 1000;
        app.state
            .identities
            .store(&identity, &app.state.encryption_key())
            .await
            .unwrap();

        send(&app, connected_request("u1", "?reminder=true")).await;
        let dms = app.platform.dms();
        assert_eq!(dms.len(), 1);
        assert!(dms[0].1.contains("Please review"));

        send(&app, connected_request("u1", "?reminder=true")).await;
        assert_eq!(app.platform.dms().len(), 1);
    }

    #[tokio::test]
    async fn private_notice_is_sent_once() {
        let app = test_app(MockGitHub::new("octo"));
        let mut config = (*app.config_snapshot()).clone();
        config.enable_private_repo = true;
        app.config.replace(config);
        link_user(&app, "u1", "octo").await;

        send(&app, connected_request("u1", "")).await;
        send(&app, connected_request("u1", "")).await;
        let dms = app.platform.dms();
        assert_eq!(dms.len(), 1);
        assert!(dms[0].1.ends_with("`/github connect private`."));
    }

    #[tokio::test]
    async fn user_lookup() {
        let app = test_app(MockGitHub::new("octo"));
        link_user(&app, "u2", "hubber").await;
        let post = |body: &'static str| {
            Request::post("/api/v1/user")
                .header(USER_ID_HEADER, "u1")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, body) = send(&app, post(r#"{"user_id":"u2"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["username"], "hubber");

        let (status, body) = send(&app, post("nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please provide a JSON object."));

        let (status, _) = send(&app, post(r#"{"user_id":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, post(r#"{"user_id":"u9"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("User is not connected to a GitHub account."));
    }

    #[tokio::test]
    async fn todo_posts_dm() {
        let app = test_app(MockGitHub::new("octo"));
        link_user(&app, "u1", "octo").await;
        let (status, body) = send(
            &app,
            Request::post("/api/v1/todo")
                .header(USER_ID_HEADER, "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["Status"], "OK");
        assert_eq!(app.platform.dms().len(), 1);
    }

    #[tokio::test]
    async fn todo_failure_is_401_envelope() {
        let app = test_app(MockGitHub::new("octo").with_search_failure(500));
        link_user(&app, "u1", "octo").await;
        let (status, body) = send(
            &app,
            Request::post("/api/v1/todo")
                .header(USER_ID_HEADER, "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Encountered an error getting the to do items."));
    }

    #[tokio::test]
    async fn settings_update() {
        let app = test_app(MockGitHub::new("octo"));
        link_user(&app, "u1", "octo").await;
        let request = |body: &'static str| {
            Request::post("/api/v1/settings")
                .header(USER_ID_HEADER, "u1")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, body) = send(
            &app,
            request(r#"{"sidebar_buttons":"left","daily_reminder":false,"notifications":true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["sidebar_buttons"], "left");
        let stored = app
            .state
            .identities
            .get("u1", &app.state.encryption_key())
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.settings.daily_reminder);

        let (status, body) = send(&app, request("null")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.trim(), "Invalid request body");
    }

    #[tokio::test]
    async fn token_for_plugins() {
        let app = test_app(MockGitHub::new("octo"));
        link_user(&app, "u1", "octo").await;
        let request = |uri: &str| {
            Request::get(uri)
                .header(PLUGIN_ID_HEADER, "other")
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = send(&app, request("/api/v1/token")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.trim(), "please provide a userID");

        let (status, body) = send(&app, request("/api/v1/token?userID=u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap()["access_token"],
            "token-u1"
        );

        let (status, _) = send(&app, request("/api/v1/token?userID=u2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

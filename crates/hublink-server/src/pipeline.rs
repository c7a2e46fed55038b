//! Middleware and extractors wrapped around every inbound request.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hublink_core::LinkedIdentity;
use hublink_github::GitHubApi;
use tracing::{error, field, info_span, warn, Instrument, Span};

use crate::codec::{plain, ApiError, ResponseKind};
use crate::config::Configuration;
use crate::crypto::key_from_secret;
use crate::routes::AppState;

pub const USER_ID_HEADER: &str = "Mattermost-User-ID";
pub const PLUGIN_ID_HEADER: &str = "Mattermost-Plugin-ID";

/// Handler for panics caught by `CatchPanicLayer`. The request URI is on
/// the enclosing trace span.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = detail, "recovered from a panic");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

pub async fn check_configured(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = state.config.get_configuration().is_valid() {
        warn!(error = %e, "rejecting request, configuration invalid");
        return ApiError::NotConfigured.into_plain();
    }
    next.run(request).await
}

fn header_value<'a>(request: &'a Request, name: &str) -> &'a str {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn require_user(request: Request, next: Next, kind: ResponseKind) -> Response {
    if header_value(&request, USER_ID_HEADER).is_empty() {
        let message = match kind {
            ResponseKind::Json => "Not authorized.",
            ResponseKind::Plain => "Not authorized",
        };
        return ApiError::Unauthorized(message.into()).respond(kind);
    }
    next.run(request).await
}

pub async fn require_user_json(request: Request, next: Next) -> Response {
    require_user(request, next, ResponseKind::Json).await
}

pub async fn require_user_plain(request: Request, next: Next) -> Response {
    require_user(request, next, ResponseKind::Plain).await
}

/// Only other plugins on the same server may call these routes.
pub async fn require_plugin(request: Request, next: Next) -> Response {
    if header_value(&request, PLUGIN_ID_HEADER).is_empty() {
        return plain(StatusCode::UNAUTHORIZED, "Not authorized");
    }
    next.run(request).await
}

/// Per-request state placed in the request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Empty when the caller is anonymous.
    pub user_id: String,
    pub request_id: String,
    pub span: Span,
}

async fn run_with_context(request: Request, next: Next, deadline: Duration) -> Response {
    let user_id = header_value(&request, USER_ID_HEADER).to_string();
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let span = info_span!(
        "request",
        user_id = %user_id,
        request_id = %request_id,
        github_username = field::Empty,
    );

    let mut request = request;
    request.extensions_mut().insert(RequestContext {
        user_id,
        request_id,
        span: span.clone(),
    });

    let handler = next.run(request).instrument(span.clone());
    match tokio::time::timeout(deadline, handler).await {
        Ok(response) => response,
        Err(_) => {
            span.in_scope(|| warn!(?deadline, "request deadline exceeded"));
            ApiError::Timeout.into_response()
        }
    }
}

/// Attach a [`RequestContext`] and run the handler under the request deadline.
pub async fn attach_context(State(state): State<AppState>, request: Request, next: Next) -> Response {
    run_with_context(request, next, state.timeouts.request).await
}

/// Like [`attach_context`], with room for the code exchange on top of the
/// request deadline.
pub async fn attach_oauth_context(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let deadline = state.timeouts.request + state.timeouts.code_exchange;
    run_with_context(request, next, deadline).await
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("request context missing".into()))
    }
}

/// A request from a caller with a linked GitHub identity.
pub struct UserContext {
    pub ctx: RequestContext,
    pub identity: LinkedIdentity,
    pub config: Arc<Configuration>,
    pub github: Arc<dyn GitHubApi>,
}

impl UserContext {
    pub fn user_id(&self) -> &str {
        &self.ctx.user_id
    }

    pub fn github_username(&self) -> &str {
        &self.identity.github_username
    }
}

impl FromRequestParts<AppState> for UserContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        let config = state.config.get_configuration();
        let key = key_from_secret(&config.encryption_key);

        let identity = state
            .identities
            .get(&ctx.user_id, &key)
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to load linked identity");
                ApiError::Internal("Unable to get user info.".into())
            })?
            .ok_or(ApiError::NotConnected)?;
        ctx.span
            .record("github_username", identity.github_username.as_str());

        let github = state
            .github
            .connect(&config.api_base(), &identity.token)
            .map_err(ApiError::from)?;

        Ok(Self {
            ctx,
            identity,
            config,
            github,
        })
    }
}

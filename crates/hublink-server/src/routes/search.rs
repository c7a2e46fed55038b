use axum::{
    body::Bytes,
    extract::Query,
    response::Response,
    routing::{get, post},
    Router,
};
use hublink_core::PrRef;
use hublink_github::aggregate::fetch_all_pr_details;
use hublink_github::queries;
use serde::Deserialize;
use tracing::warn;

use super::AppState;
use crate::codec::{write_json, ApiError};
use crate::pipeline::UserContext;
use crate::todo::unread_notifications;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(reviews))
        .route("/yourprs", get(your_prs))
        .route("/yourassignments", get(your_assignments))
        .route("/mentions", get(mentions))
        .route("/unreads", get(unreads))
        .route("/searchissues", get(search_issues))
        .route("/prsdetails", post(prs_details))
}

async fn run_search(user: &UserContext, query: String) -> Response {
    match user.github.search_issues(&query).await {
        Ok(issues) => write_json(&issues),
        Err(e) => {
            warn!(error = %e, query = %query, "failed to search issues");
            ApiError::from(e).into_json()
        }
    }
}

async fn reviews(user: UserContext) -> Response {
    let query = queries::review_requests(user.github_username(), user.config.org());
    run_search(&user, query).await
}

async fn your_prs(user: UserContext) -> Response {
    let query = queries::open_pull_requests(user.github_username(), user.config.org());
    run_search(&user, query).await
}

async fn your_assignments(user: UserContext) -> Response {
    let query = queries::assignments(user.github_username(), user.config.org());
    run_search(&user, query).await
}

async fn mentions(user: UserContext) -> Response {
    let query = queries::mentions(user.github_username(), user.config.org());
    run_search(&user, query).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    term: String,
}

async fn search_issues(user: UserContext, Query(query): Query<SearchQuery>) -> Response {
    let query = queries::issue_search(&query.term, user.config.org());
    run_search(&user, query).await
}

async fn unreads(user: UserContext) -> Response {
    match user.github.list_notifications().await {
        Ok(notifications) => write_json(&unread_notifications(notifications, user.config.org())),
        Err(e) => {
            warn!(error = %e, "failed to list notifications");
            ApiError::from(e).into_json()
        }
    }
}

async fn prs_details(user: UserContext, body: Bytes) -> Response {
    let refs: Vec<PrRef> = match serde_json::from_slice(&body) {
        Ok(refs) => refs,
        Err(e) => {
            warn!(error = %e, "error decoding PR details body");
            return ApiError::BadRequest("Please provide a JSON object.".into()).into_json();
        }
    };
    write_json(&fetch_all_pr_details(user.github.clone(), refs).await)
}

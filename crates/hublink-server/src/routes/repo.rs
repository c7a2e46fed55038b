use axum::{extract::Query, response::Response, routing::get, Router};
use hublink_github::queries::strip_html_comments;
use hublink_github::repos::{list_all_assignees, list_all_labels, list_all_milestones, list_repositories};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::AppState;
use crate::codec::{write_json, ApiError};
use crate::pipeline::UserContext;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/issue", get(issue_by_number))
        .route("/pr", get(pr_by_number))
        .route("/labels", get(labels))
        .route("/assignees", get(assignees))
        .route("/milestones", get(milestones))
        .route("/repositories", get(repositories))
}

/// Split an `owner/name` parameter.
pub(crate) fn parse_repo(param: &str) -> Result<(&str, &str), ApiError> {
    if param.is_empty() {
        return Err(ApiError::BadRequest("repository cannot be blank".into()));
    }
    let mut parts = param.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) => Ok((owner, repo)),
        _ => Err(ApiError::BadRequest("invalid repository".into())),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NumberQuery {
    owner: String,
    repo: String,
    number: String,
}

impl NumberQuery {
    fn number(&self) -> Result<u64, ApiError> {
        self.number
            .trim()
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid param 'number'.".into()))
    }
}

async fn issue_by_number(user: UserContext, Query(query): Query<NumberQuery>) -> Response {
    let number = match query.number() {
        Ok(number) => number,
        Err(e) => return e.into_json(),
    };
    match user.github.get_issue(&query.owner, &query.repo, number).await {
        Ok(mut issue) => {
            issue.body = issue.body.map(|body| strip_html_comments(&body));
            write_json(&issue)
        }
        // Usually a private repository the token cannot see.
        Err(e) if e.is_not_found() => {
            debug!(owner = %query.owner, repo = %query.repo, number, "issue not found");
            write_json(&Value::Null)
        }
        Err(e) => {
            warn!(error = %e, owner = %query.owner, repo = %query.repo, number, "could not get issue");
            ApiError::Internal("Could not get issue".into()).into_json()
        }
    }
}

async fn pr_by_number(user: UserContext, Query(query): Query<NumberQuery>) -> Response {
    let number = match query.number() {
        Ok(number) => number,
        Err(e) => return e.into_json(),
    };
    match user
        .github
        .get_pull_request(&query.owner, &query.repo, number)
        .await
    {
        Ok(mut pr) => {
            pr.body = pr.body.map(|body| strip_html_comments(&body));
            write_json(&pr)
        }
        Err(e) if e.is_not_found() => {
            debug!(owner = %query.owner, repo = %query.repo, number, "pull request not found");
            write_json(&Value::Null)
        }
        Err(e) => {
            warn!(error = %e, owner = %query.owner, repo = %query.repo, number, "could not get pull request");
            ApiError::Internal("Could not get pull request".into()).into_json()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RepoQuery {
    repo: String,
}

async fn labels(user: UserContext, Query(query): Query<RepoQuery>) -> Response {
    let (owner, repo) = match parse_repo(&query.repo) {
        Ok(parts) => parts,
        Err(e) => return e.into_json(),
    };
    match list_all_labels(user.github.as_ref(), owner, repo).await {
        Ok(labels) => write_json(&labels),
        Err(e) => {
            warn!(error = %e, "failed to list labels");
            ApiError::Internal("Failed to fetch labels".into()).into_json()
        }
    }
}

async fn assignees(user: UserContext, Query(query): Query<RepoQuery>) -> Response {
    let (owner, repo) = match parse_repo(&query.repo) {
        Ok(parts) => parts,
        Err(e) => return e.into_json(),
    };
    match list_all_assignees(user.github.as_ref(), owner, repo).await {
        Ok(assignees) => write_json(&assignees),
        Err(e) => {
            warn!(error = %e, "failed to list assignees");
            ApiError::Internal("Failed to fetch assignees".into()).into_json()
        }
    }
}

async fn milestones(user: UserContext, Query(query): Query<RepoQuery>) -> Response {
    let (owner, repo) = match parse_repo(&query.repo) {
        Ok(parts) => parts,
        Err(e) => return e.into_json(),
    };
    match list_all_milestones(user.github.as_ref(), owner, repo).await {
        Ok(milestones) => write_json(&milestones),
        Err(e) => {
            warn!(error = %e, "failed to list milestones");
            ApiError::Internal("Failed to fetch milestones".into()).into_json()
        }
    }
}

async fn repositories(user: UserContext) -> Response {
    match list_repositories(user.github.as_ref(), user.config.org()).await {
        Ok(repos) => write_json(&repos),
        Err(e) => {
            warn!(error = %e, "failed to list repositories");
            ApiError::Internal("Failed to fetch repositories".into()).into_json()
        }
    }
}

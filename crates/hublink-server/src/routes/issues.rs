use axum::{body::Bytes, extract::State, response::Response, routing::post, Router};
use hublink_github::models::NewIssue;
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use crate::codec::{write_json, ApiError};
use crate::pipeline::UserContext;
use crate::platform::Post;
use crate::routes::repo::parse_repo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/createissue", post(create_issue))
        .route("/createissuecomment", post(create_issue_comment))
}

/// Human explanation for a failed write to GitHub.
pub(crate) fn fail_reason(status: u16, repo: &str, username: &str) -> String {
    match status {
        500 => "Internal server error".to_string(),
        400 => "Bad request".to_string(),
        404 => format!(
            "Sorry, either you don't have access to the repo {repo} with the user {username} or it is no longer available"
        ),
        401 => format!("Sorry, your user {username} is unauthorized to do this action"),
        403 => format!(
            "Sorry, you don't have enough permissions to comment in the repo {repo} with the user {username}"
        ),
        other => format!("Unknown status code {other}"),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "error decoding request body");
        ApiError::BadRequest("Please provide a JSON object.".into())
    })
}

/// Load a post and the display name of its author.
async fn load_post(state: &AppState, post_id: &str) -> Result<(Post, String), ApiError> {
    let post = match state.platform.get_post(post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            return Err(ApiError::NotFound(format!(
                "failed to load post {post_id}: not found"
            )))
        }
        Err(e) => {
            warn!(error = %e, post_id, "failed to load post");
            return Err(ApiError::Internal(format!("failed to load post {post_id}")));
        }
    };
    match state.platform.get_user(&post.user_id).await {
        Ok(Some(author)) => Ok((post, author.username)),
        Ok(None) => Err(ApiError::Internal("failed to get username".into())),
        Err(e) => {
            warn!(error = %e, user_id = %post.user_id, "failed to get username");
            Err(ApiError::Internal("failed to get username".into()))
        }
    }
}

fn thread_root(post: &Post) -> &str {
    if post.root_id.is_empty() {
        &post.id
    } else {
        &post.root_id
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateIssueRequest {
    title: String,
    body: String,
    repo: String,
    post_id: String,
    channel_id: String,
    labels: Vec<String>,
    assignees: Vec<String>,
    milestone: i64,
}

async fn create_issue(State(state): State<AppState>, user: UserContext, body: Bytes) -> Response {
    match try_create_issue(&state, &user, body).await {
        Ok(response) => response,
        Err(e) => e.into_json(),
    }
}

async fn try_create_issue(
    state: &AppState,
    user: &UserContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateIssueRequest = decode(&body)?;
    if request.title.is_empty() {
        return Err(ApiError::BadRequest("Please provide a valid issue title.".into()));
    }
    if request.repo.is_empty() {
        return Err(ApiError::BadRequest("Please provide a valid repo name.".into()));
    }
    if request.post_id.is_empty() && request.channel_id.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide either a postID or a channelID".into(),
        ));
    }

    let mut source = None;
    let mut footer = String::new();
    if !request.post_id.is_empty() {
        let (post, author) = load_post(state, &request.post_id).await?;
        let permalink = user.config.permalink(&request.post_id);
        footer = format!("_Issue created from a [Mattermost message]({permalink}) *by {author}*._");
        source = Some((post, permalink));
    }

    let mut issue_body = request.body;
    if !issue_body.is_empty() && !footer.is_empty() {
        issue_body.push_str("\n\n");
    }
    issue_body.push_str(&footer);

    let new_issue = NewIssue {
        title: request.title,
        body: issue_body,
        labels: request.labels,
        assignees: request.assignees,
        milestone: u64::try_from(request.milestone).ok().filter(|m| *m > 0),
    };

    let current_user = match state.platform.get_user(user.user_id()).await {
        Ok(Some(current)) => current,
        Ok(None) => return Err(ApiError::Internal("failed to load current user".into())),
        Err(e) => {
            warn!(error = %e, "failed to load current user");
            return Err(ApiError::Internal("failed to load current user".into()));
        }
    };

    let (owner, repo) = parse_repo(&request.repo)?;
    let created = match user.github.create_issue(owner, repo, &new_issue).await {
        Ok(created) => created,
        Err(e) if e.status() == Some(410) => {
            return Err(ApiError::MethodNotAllowed(
                "Issues are disabled on this repository.".into(),
            ))
        }
        Err(e) => {
            warn!(error = %e, repo = %request.repo, "failed to create issue");
            let status = e.status().unwrap_or(500);
            return Err(ApiError::Upstream {
                status,
                message: format!(
                    "failed to create issue: {}",
                    fail_reason(status, &request.repo, &current_user.username)
                ),
            });
        }
    };
    info!(repo = %request.repo, number = created.number, "issue created");

    let mut message = format!(
        "Created GitHub issue [#{}]({})",
        created.number, created.html_url
    );
    match source {
        Some((post, permalink)) => {
            message.push_str(&format!(" from a [message]({permalink})"));
            let reply = Post::reply(user.user_id(), &post.channel_id, thread_root(&post), message);
            if let Err(e) = state.messenger.create_post(reply).await {
                warn!(error = %e, "failed to create notification post");
                return Err(ApiError::Internal(format!(
                    "failed to create notification post, postID: {}, channelID: {}",
                    request.post_id, post.channel_id
                )));
            }
        }
        None => {
            let reply = Post::reply(user.user_id(), &request.channel_id, "", message);
            if let Err(e) = state.messenger.send_ephemeral_post(user.user_id(), reply).await {
                warn!(error = %e, "failed to send ephemeral notification");
            }
        }
    }

    Ok(write_json(&created))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateCommentRequest {
    post_id: String,
    owner: String,
    repo: String,
    number: u64,
    comment: String,
}

async fn create_issue_comment(
    State(state): State<AppState>,
    user: UserContext,
    body: Bytes,
) -> Response {
    match try_create_issue_comment(&state, &user, body).await {
        Ok(response) => response,
        Err(e) => e.into_json(),
    }
}

async fn try_create_issue_comment(
    state: &AppState,
    user: &UserContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateCommentRequest = decode(&body)?;
    let missing = if request.post_id.is_empty() {
        Some("Please provide a valid post id")
    } else if request.owner.is_empty() {
        Some("Please provide a valid repo owner.")
    } else if request.repo.is_empty() {
        Some("Please provide a valid repo.")
    } else if request.number == 0 {
        Some("Please provide a valid issue number.")
    } else if request.comment.is_empty() {
        Some("Please provide a valid non empty comment.")
    } else {
        None
    };
    if let Some(message) = missing {
        return Err(ApiError::BadRequest(message.into()));
    }

    let (post, author) = load_post(state, &request.post_id).await?;
    let gh_username = user.github_username();
    let permalink = user.config.permalink(&request.post_id);
    let text = format!(
        "*@{gh_username} attached a* [message]({permalink}) *from {author}*\n\n{}",
        request.comment
    );

    let comment = match user
        .github
        .create_issue_comment(&request.owner, &request.repo, request.number, &text)
        .await
    {
        Ok(comment) => comment,
        Err(e) => {
            warn!(error = %e, owner = %request.owner, repo = %request.repo, "failed to create issue comment");
            let status = e.status().unwrap_or(500);
            return Err(ApiError::Upstream {
                status,
                message: format!(
                    "failed to create an issue comment: {}",
                    fail_reason(status, &request.repo, gh_username)
                ),
            });
        }
    };

    let message = format!(
        "[Message]({permalink}) attached to GitHub issue [#{}]({})",
        request.number, comment.html_url
    );
    let reply = Post::reply(user.user_id(), &post.channel_id, thread_root(&post), message);
    if let Err(e) = state.messenger.create_post(reply).await {
        warn!(error = %e, "failed to create notification post");
        return Err(ApiError::Internal(format!(
            "failed to create notification post {}",
            request.post_id
        )));
    }

    Ok(write_json(&comment))
}

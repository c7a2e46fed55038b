use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hublink_core::OAuthToken;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::models::{
    CombinedStatus, Issue, IssueComment, Label, Milestone, NewIssue, Notification, PullRequest,
    Repository, Review, SearchResult, User,
};
use crate::pagination::{Page, PageRequest};
use crate::GitHubError;

const PUBLIC_API_BASE: &str = "https://api.github.com";
const PUBLIC_WEB_BASE: &str = "https://github.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ERROR_BODY: usize = 512;

/// REST API root for github.com or a GitHub Enterprise install.
pub fn api_base_url(enterprise_base_url: Option<&str>) -> String {
    match enterprise_base_url.map(str::trim).filter(|s| !s.is_empty()) {
        Some(base) => format!("{}/api/v3", base.trim_end_matches('/')),
        None => PUBLIC_API_BASE.to_string(),
    }
}

/// Web root (with trailing slash) for github.com or a GitHub Enterprise install.
pub fn web_base_url(enterprise_base_url: Option<&str>) -> String {
    match enterprise_base_url.map(str::trim).filter(|s| !s.is_empty()) {
        Some(base) => format!("{}/", base.trim_end_matches('/')),
        None => PUBLIC_WEB_BASE.to_string(),
    }
}

/// The GitHub operations hublink performs on behalf of a linked user.
///
/// Every failure carries the upstream HTTP status when GitHub produced one.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn current_user(&self) -> Result<User, GitHubError>;

    /// First page of an issue search.
    async fn search_issues(&self, query: &str) -> Result<Vec<Issue>, GitHubError>;

    /// First page of the user's notifications.
    async fn list_notifications(&self) -> Result<Vec<Notification>, GitHubError>;

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, GitHubError>;

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubError>;

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GitHubError>;

    async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GitHubError>;

    async fn list_labels(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Label>, GitHubError>;

    async fn list_assignees(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<User>, GitHubError>;

    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Milestone>, GitHubError>;

    /// Repositories of `user`, or of the authenticated user when `None`.
    async fn list_user_repos(
        &self,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError>;

    /// Repositories of an organisation, sorted by full name.
    async fn list_org_repos(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError>;

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError>;
}

/// Builds an authenticated client for one user's token.
pub trait GitHubConnector: Send + Sync {
    fn connect(&self, api_base: &str, token: &OAuthToken)
        -> Result<Arc<dyn GitHubApi>, GitHubError>;
}

/// Connector producing [`HttpGitHubClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl GitHubConnector for HttpConnector {
    fn connect(
        &self,
        api_base: &str,
        token: &OAuthToken,
    ) -> Result<Arc<dyn GitHubApi>, GitHubError> {
        Ok(Arc::new(HttpGitHubClient::new(api_base, token)?))
    }
}

/// reqwest-backed [`GitHubApi`].
#[derive(Clone)]
pub struct HttpGitHubClient {
    http: Client,
    api_base: String,
}

impl HttpGitHubClient {
    pub fn new(api_base: &str, token: &OAuthToken) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("hublink"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.access_token.trim()))
            .map_err(|e| GitHubError::Config(format!("invalid authorization header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GitHubError::Config(format!("HTTP client init: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GitHubError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GitHubError> {
        debug!(path, "GET");
        let resp = self.send(self.http.get(self.url(path))).await?;
        decode(resp).await
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
        page: PageRequest,
    ) -> Result<Page<T>, GitHubError> {
        debug!(path, page = page.page, "GET page");
        let builder = self
            .http
            .get(self.url(path))
            .query(extra)
            .query(&[("page", page.page), ("per_page", page.per_page)]);
        let resp = self.send(builder).await?;
        let next_page = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_from_link);
        let items = decode(resp).await?;
        Ok(Page { items, next_page })
    }

    async fn post_json<B: serde::Serialize + ?Sized + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GitHubError> {
        debug!(path, "POST");
        let resp = self.send(self.http.post(self.url(path)).json(body)).await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, GitHubError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GitHubError::Decode(e.to_string()))
}

async fn error_from_response(resp: Response) -> GitHubError {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.is_empty() => format!("status {status}"),
        Err(_) => text.chars().take(MAX_ERROR_BODY).collect(),
    };
    GitHubError::Api { status, message }
}

/// Extract the `page` query value of the `rel="next"` entry of a Link header.
pub(crate) fn next_page_from_link(header: &str) -> Option<u32> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let url = url::Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}

#[async_trait]
impl GitHubApi for HttpGitHubClient {
    async fn current_user(&self) -> Result<User, GitHubError> {
        self.get_json("/user").await
    }

    async fn search_issues(&self, query: &str) -> Result<Vec<Issue>, GitHubError> {
        debug!(query, "search issues");
        let builder = self
            .http
            .get(self.url("/search/issues"))
            .query(&[("q", query)]);
        let resp = self.send(builder).await?;
        let result: SearchResult<Issue> = decode(resp).await?;
        Ok(result.items)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, GitHubError> {
        self.get_json("/notifications").await
    }

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, GitHubError> {
        self.get_json(&format!("/repos/{owner}/{repo}/issues/{number}"))
            .await
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubError> {
        self.get_json(&format!("/repos/{owner}/{repo}/pulls/{number}"))
            .await
    }

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GitHubError> {
        self.get_json(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews"))
            .await
    }

    async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GitHubError> {
        self.get_json(&format!("/repos/{owner}/{repo}/commits/{sha}/status"))
            .await
    }

    async fn list_labels(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Label>, GitHubError> {
        self.get_page(&format!("/repos/{owner}/{repo}/labels"), &[], page)
            .await
    }

    async fn list_assignees(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<User>, GitHubError> {
        self.get_page(&format!("/repos/{owner}/{repo}/assignees"), &[], page)
            .await
    }

    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Milestone>, GitHubError> {
        self.get_page(&format!("/repos/{owner}/{repo}/milestones"), &[], page)
            .await
    }

    async fn list_user_repos(
        &self,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError> {
        let path = match user {
            Some(user) => format!("/users/{user}/repos"),
            None => "/user/repos".to_string(),
        };
        self.get_page(&path, &[], page).await
    }

    async fn list_org_repos(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError> {
        self.get_page(&format!("/orgs/{org}/repos"), &[("sort", "full_name")], page)
            .await
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError> {
        self.post_json(&format!("/repos/{owner}/{repo}/issues"), issue)
            .await
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        let payload = serde_json::json!({ "body": body });
        self.post_json(
            &format!("/repos/{owner}/{repo}/issues/{number}/comments"),
            &payload,
        )
        .await
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hublink_core::OAuthToken;

use crate::models::{
    CombinedStatus, Issue, IssueComment, Label, Milestone, NewIssue, Notification, PullRequest,
    Repository, Review, User,
};
use crate::pagination::{Page, PageRequest};
use crate::{GitHubApi, GitHubConnector, GitHubError};

fn api_error(status: u16, message: &str) -> GitHubError {
    GitHubError::Api {
        status,
        message: message.to_string(),
    }
}

fn not_found() -> GitHubError {
    api_error(404, "Not Found")
}

fn page_of<T: Clone>(
    pages: &[Vec<T>],
    req: PageRequest,
    fail_on: Option<u32>,
) -> Result<Page<T>, GitHubError> {
    if fail_on == Some(req.page) {
        return Err(api_error(500, "mock page failure"));
    }
    let idx = req.page.saturating_sub(1) as usize;
    let items = pages.get(idx).cloned().unwrap_or_default();
    if idx + 1 < pages.len() {
        Ok(Page::with_next(items, req.page + 1))
    } else {
        Ok(Page::last(items))
    }
}

/// In-memory [`GitHubApi`] with configurable results, failures and delays.
///
/// Records every call by name so tests can assert on what was fetched.
#[derive(Default)]
pub struct MockGitHub {
    user: User,
    current_user_fails: bool,
    search: HashMap<String, Vec<Issue>>,
    search_fails: Option<u16>,
    notifications: Vec<Notification>,
    issues: HashMap<u64, Issue>,
    pull_requests: HashMap<u64, PullRequest>,
    failing_pull_requests: HashSet<u64>,
    reviews: HashMap<u64, Vec<Review>>,
    failing_reviews: HashSet<u64>,
    statuses: HashMap<String, CombinedStatus>,
    delays: HashMap<u64, Duration>,
    labels: Vec<Vec<Label>>,
    assignees: Vec<Vec<User>>,
    milestones: Vec<Vec<Milestone>>,
    user_repos: HashMap<String, Vec<Vec<Repository>>>,
    org_repos: Vec<Vec<Repository>>,
    org_repos_fails: Option<u16>,
    fail_on_page: Option<u32>,
    create_issue_fails: Option<u16>,
    created_issues: Mutex<Vec<(String, String, NewIssue)>>,
    created_comments: Mutex<Vec<(String, String, u64, String)>>,
    calls: Mutex<Vec<String>>,
}

impl MockGitHub {
    pub fn new(login: &str) -> Self {
        Self {
            user: User::new(login),
            ..Default::default()
        }
    }

    pub fn with_current_user_failure(mut self) -> Self {
        self.current_user_fails = true;
        self
    }

    pub fn with_search(mut self, query: impl Into<String>, items: Vec<Issue>) -> Self {
        self.search.insert(query.into(), items);
        self
    }

    pub fn with_search_failure(mut self, status: u16) -> Self {
        self.search_fails = Some(status);
        self
    }

    pub fn with_notifications(mut self, notifications: Vec<Notification>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.insert(issue.number, issue);
        self
    }

    pub fn with_pull_request(mut self, pr: PullRequest) -> Self {
        self.pull_requests.insert(pr.number, pr);
        self
    }

    pub fn with_pull_request_failure(mut self, number: u64) -> Self {
        self.failing_pull_requests.insert(number);
        self
    }

    pub fn with_reviews(mut self, number: u64, reviews: Vec<Review>) -> Self {
        self.reviews.insert(number, reviews);
        self
    }

    pub fn with_reviews_failure(mut self, number: u64) -> Self {
        self.failing_reviews.insert(number);
        self
    }

    pub fn with_status(mut self, sha: impl Into<String>, state: impl Into<String>) -> Self {
        let sha = sha.into();
        self.statuses.insert(
            sha.clone(),
            CombinedStatus {
                state: state.into(),
                sha,
                total_count: 1,
            },
        );
        self
    }

    /// Delay every per-PR call for `number`, to shuffle completion order.
    pub fn with_delay(mut self, number: u64, delay: Duration) -> Self {
        self.delays.insert(number, delay);
        self
    }

    pub fn with_label_pages(mut self, pages: Vec<Vec<Label>>) -> Self {
        self.labels = pages;
        self
    }

    pub fn with_assignee_pages(mut self, pages: Vec<Vec<User>>) -> Self {
        self.assignees = pages;
        self
    }

    pub fn with_milestone_pages(mut self, pages: Vec<Vec<Milestone>>) -> Self {
        self.milestones = pages;
        self
    }

    /// Pages for `/users/{user}/repos`; an empty `user` means the
    /// authenticated user.
    pub fn with_user_repo_pages(mut self, user: &str, pages: Vec<Vec<Repository>>) -> Self {
        self.user_repos.insert(user.to_string(), pages);
        self
    }

    pub fn with_org_repo_pages(mut self, pages: Vec<Vec<Repository>>) -> Self {
        self.org_repos = pages;
        self
    }

    pub fn with_org_repos_failure(mut self, status: u16) -> Self {
        self.org_repos_fails = Some(status);
        self
    }

    /// Fail every paginated list call when it reaches `page`.
    pub fn with_failure_on_page(mut self, page: u32) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn with_create_issue_failure(mut self, status: u16) -> Self {
        self.create_issue_fails = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created_issues(&self) -> Vec<(String, String, NewIssue)> {
        self.created_issues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created_comments(&self) -> Vec<(String, String, u64, String)> {
        self.created_comments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    async fn delay_for(&self, number: u64) {
        if let Some(delay) = self.delays.get(&number) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn current_user(&self) -> Result<User, GitHubError> {
        self.record("current_user".into());
        if self.current_user_fails {
            return Err(api_error(401, "Bad credentials"));
        }
        Ok(self.user.clone())
    }

    async fn search_issues(&self, query: &str) -> Result<Vec<Issue>, GitHubError> {
        self.record(format!("search_issues {query}"));
        if let Some(status) = self.search_fails {
            return Err(api_error(status, "mock search failure"));
        }
        Ok(self.search.get(query).cloned().unwrap_or_default())
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, GitHubError> {
        self.record("list_notifications".into());
        Ok(self.notifications.clone())
    }

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, GitHubError> {
        self.record(format!("get_issue {owner}/{repo}#{number}"));
        self.issues.get(&number).cloned().ok_or_else(not_found)
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubError> {
        self.record(format!("get_pull_request {owner}/{repo}#{number}"));
        self.delay_for(number).await;
        if self.failing_pull_requests.contains(&number) {
            return Err(api_error(500, "mock pull request failure"));
        }
        self.pull_requests.get(&number).cloned().ok_or_else(not_found)
    }

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>, GitHubError> {
        self.record(format!("list_reviews {owner}/{repo}#{number}"));
        self.delay_for(number).await;
        if self.failing_reviews.contains(&number) {
            return Err(api_error(500, "mock reviews failure"));
        }
        Ok(self.reviews.get(&number).cloned().unwrap_or_default())
    }

    async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, GitHubError> {
        self.record(format!("combined_status {owner}/{repo}@{sha}"));
        self.statuses.get(sha).cloned().ok_or_else(not_found)
    }

    async fn list_labels(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Label>, GitHubError> {
        self.record(format!("list_labels {owner}/{repo} page={}", page.page));
        page_of(&self.labels, page, self.fail_on_page)
    }

    async fn list_assignees(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<User>, GitHubError> {
        self.record(format!("list_assignees {owner}/{repo} page={}", page.page));
        page_of(&self.assignees, page, self.fail_on_page)
    }

    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Page<Milestone>, GitHubError> {
        self.record(format!("list_milestones {owner}/{repo} page={}", page.page));
        page_of(&self.milestones, page, self.fail_on_page)
    }

    async fn list_user_repos(
        &self,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError> {
        let user = user.unwrap_or_default();
        self.record(format!("list_user_repos {user} page={}", page.page));
        match self.user_repos.get(user) {
            Some(pages) => page_of(pages, page, self.fail_on_page),
            None => Err(not_found()),
        }
    }

    async fn list_org_repos(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Page<Repository>, GitHubError> {
        self.record(format!("list_org_repos {org} page={}", page.page));
        if let Some(status) = self.org_repos_fails {
            return Err(api_error(status, "mock org failure"));
        }
        page_of(&self.org_repos, page, self.fail_on_page)
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError> {
        self.record(format!("create_issue {owner}/{repo}"));
        if let Some(status) = self.create_issue_fails {
            return Err(api_error(status, "mock create failure"));
        }
        let mut created = self
            .created_issues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        created.push((owner.to_string(), repo.to_string(), issue.clone()));
        let number = created.len() as u64;
        Ok(Issue {
            number,
            title: issue.title.clone(),
            body: Some(issue.body.clone()),
            html_url: format!("https://github.com/{owner}/{repo}/issues/{number}"),
            ..Default::default()
        })
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        self.record(format!("create_issue_comment {owner}/{repo}#{number}"));
        let mut created = self
            .created_comments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        created.push((owner.to_string(), repo.to_string(), number, body.to_string()));
        let id = created.len() as u64;
        Ok(IssueComment {
            id,
            body: body.to_string(),
            html_url: format!("https://github.com/{owner}/{repo}/issues/{number}#issuecomment-{id}"),
            ..Default::default()
        })
    }
}

/// Connector that hands out one shared [`MockGitHub`] and remembers the
/// tokens it was asked to connect with.
pub struct MockConnector {
    api: Arc<MockGitHub>,
    tokens: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(api: Arc<MockGitHub>) -> Self {
        Self {
            api,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn api(&self) -> &Arc<MockGitHub> {
        &self.api
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl GitHubConnector for MockConnector {
    fn connect(
        &self,
        _api_base: &str,
        token: &OAuthToken,
    ) -> Result<Arc<dyn GitHubApi>, GitHubError> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.access_token.clone());
        Ok(self.api.clone())
    }
}

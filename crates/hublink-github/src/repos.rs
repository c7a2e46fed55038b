//! Drained repository-scoped listings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{Label, Milestone, Repository, User};
use crate::pagination::{collect_pages, DEFAULT_PER_PAGE};
use crate::{GitHubApi, GitHubError};

pub async fn list_all_labels(
    api: &dyn GitHubApi,
    owner: &str,
    repo: &str,
) -> Result<Vec<Label>, GitHubError> {
    collect_pages(DEFAULT_PER_PAGE, move |page| api.list_labels(owner, repo, page)).await
}

pub async fn list_all_assignees(
    api: &dyn GitHubApi,
    owner: &str,
    repo: &str,
) -> Result<Vec<User>, GitHubError> {
    collect_pages(DEFAULT_PER_PAGE, move |page| api.list_assignees(owner, repo, page)).await
}

pub async fn list_all_milestones(
    api: &dyn GitHubApi,
    owner: &str,
    repo: &str,
) -> Result<Vec<Milestone>, GitHubError> {
    collect_pages(DEFAULT_PER_PAGE, move |page| api.list_milestones(owner, repo, page)).await
}

/// Repository entry returned to the webapp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    pub full_name: String,
    pub permissions: BTreeMap<String, bool>,
}

impl From<Repository> for RepositorySummary {
    fn from(repo: Repository) -> Self {
        Self {
            name: repo.name,
            full_name: repo.full_name,
            permissions: repo.permissions.unwrap_or_default(),
        }
    }
}

/// Every repository visible for the configured organisation, or for the
/// authenticated user when no organisation is set.
///
/// An organisation that does not exist (404) is retried as a user account
/// of the same name; any other failure is returned.
pub async fn list_repositories(
    api: &dyn GitHubApi,
    org: Option<&str>,
) -> Result<Vec<RepositorySummary>, GitHubError> {
    let org = org.map(str::trim).filter(|o| !o.is_empty());
    let repos = match org {
        None => collect_pages(DEFAULT_PER_PAGE, move |page| api.list_user_repos(None, page)).await?,
        Some(org) => {
            match collect_pages(DEFAULT_PER_PAGE, move |page| api.list_org_repos(org, page)).await {
                Ok(repos) => repos,
                Err(e) if e.is_not_found() => {
                    info!(org, "organisation not found, listing as user repositories");
                    collect_pages(DEFAULT_PER_PAGE, move |page| api.list_user_repos(Some(org), page))
                        .await?
                }
                Err(e) => return Err(e),
            }
        }
    };
    Ok(repos.into_iter().map(RepositorySummary::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGitHub;

    fn repo(full_name: &str) -> Repository {
        let (_, name) = full_name.split_once('/').unwrap();
        Repository {
            name: name.to_string(),
            full_name: full_name.to_string(),
            permissions: Some(BTreeMap::from([("push".to_string(), true)])),
            ..Default::default()
        }
    }

    fn label(name: &str) -> Label {
        Label {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn labels_drain_all_pages() {
        let api = MockGitHub::new("octo").with_label_pages(vec![
            vec![label("bug"), label("docs")],
            vec![label("feature")],
        ]);
        let labels = list_all_labels(&api, "a", "b").await.unwrap();
        let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["bug", "docs", "feature"]);
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn assignee_page_failure_aborts() {
        let api = MockGitHub::new("octo")
            .with_assignee_pages(vec![vec![User::new("a")], vec![User::new("b")]])
            .with_failure_on_page(2);
        let err = list_all_assignees(&api, "a", "b").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn milestones_single_page() {
        let api = MockGitHub::new("octo").with_milestone_pages(vec![vec![Milestone {
            number: 1,
            title: "v1".into(),
            ..Default::default()
        }]]);
        let milestones = list_all_milestones(&api, "a", "b").await.unwrap();
        assert_eq!(milestones[0].title, "v1");
    }

    #[tokio::test]
    async fn user_repositories_without_org() {
        let api = MockGitHub::new("octo")
            .with_user_repo_pages("", vec![vec![repo("octo/one")], vec![repo("octo/two")]]);
        let repos = list_repositories(&api, None).await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[1].full_name, "octo/two");
        assert_eq!(repos[0].permissions.get("push"), Some(&true));
    }

    #[tokio::test]
    async fn org_repositories() {
        let api = MockGitHub::new("octo").with_org_repo_pages(vec![vec![repo("acme/app")]]);
        let repos = list_repositories(&api, Some("acme")).await.unwrap();
        assert_eq!(repos[0].name, "app");
        assert!(api.calls()[0].starts_with("list_org_repos acme"));
    }

    #[tokio::test]
    async fn missing_org_falls_back_to_user() {
        let api = MockGitHub::new("octo")
            .with_org_repos_failure(404)
            .with_user_repo_pages("acme", vec![vec![repo("acme/personal")]]);
        let repos = list_repositories(&api, Some("acme")).await.unwrap();
        assert_eq!(repos[0].full_name, "acme/personal");
    }

    #[tokio::test]
    async fn other_org_failures_are_fatal() {
        let api = MockGitHub::new("octo")
            .with_org_repos_failure(403)
            .with_user_repo_pages("acme", vec![vec![repo("acme/personal")]]);
        let err = list_repositories(&api, Some("acme")).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}

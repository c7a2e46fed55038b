use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one pull request in a `prsdetails` request.
///
/// `url` is the repository URL as returned by issue search
/// (`https://api.github.com/repos/<owner>/<repo>`); only its last two path
/// segments are used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRef {
    pub url: String,
    pub number: u64,
}

impl PrRef {
    pub fn new(url: impl Into<String>, number: u64) -> Self {
        Self {
            url: url.into(),
            number,
        }
    }

    /// `(owner, repo)` taken from the last two path segments of `url`.
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        let mut segments = self
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .filter(|s| !s.is_empty());
        let repo = segments.next()?;
        let owner = segments.next()?;
        if owner.contains(':') {
            return None;
        }
        Some((owner, repo))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAuthor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub user: Option<ReviewAuthor>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Composite view of one pull request assembled from several upstream calls.
///
/// Any field whose sub-fetch failed holds its empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDetail {
    pub url: String,
    pub number: u64,
    pub status: String,
    pub mergeable: bool,
    pub requested_reviewers: Vec<String>,
    pub reviews: Vec<Review>,
}

impl PullRequestDetail {
    pub fn empty(pr: &PrRef) -> Self {
        Self {
            url: pr.url.clone(),
            number: pr.number,
            status: String::new(),
            mergeable: false,
            requested_reviewers: Vec::new(),
            reviews: Vec::new(),
        }
    }
}

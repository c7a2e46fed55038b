//! Per-pull-request detail assembly.
//!
//! Each detail is built from two independent sub-fetches that run
//! concurrently; a batch of refs fans out one task per ref. Sub-fetch
//! failures are logged and leave the affected fields empty.

use std::sync::Arc;

use hublink_core::{PrRef, PullRequestDetail, Review};
use tokio::task::JoinSet;
use tracing::{warn, Instrument};

use crate::GitHubApi;

struct MergeState {
    status: String,
    mergeable: bool,
    requested_reviewers: Vec<String>,
}

impl MergeState {
    fn empty() -> Self {
        Self {
            status: String::new(),
            mergeable: false,
            requested_reviewers: Vec::new(),
        }
    }
}

async fn fetch_reviews(
    api: &dyn GitHubApi,
    owner: &str,
    repo: &str,
    number: u64,
) -> Vec<Review> {
    match api.list_reviews(owner, repo, number).await {
        Ok(reviews) => reviews,
        Err(e) => {
            warn!(owner, repo, number, error = %e, "failed to fetch reviews for PR details");
            Vec::new()
        }
    }
}

async fn fetch_merge_state(api: &dyn GitHubApi, owner: &str, repo: &str, number: u64) -> MergeState {
    let pr = match api.get_pull_request(owner, repo, number).await {
        Ok(pr) => pr,
        Err(e) => {
            warn!(owner, repo, number, error = %e, "failed to fetch PR for PR details");
            return MergeState::empty();
        }
    };

    let mut state = MergeState {
        status: String::new(),
        mergeable: pr.mergeable.unwrap_or(false),
        requested_reviewers: pr.requested_reviewers.into_iter().map(|u| u.login).collect(),
    };
    match api.combined_status(owner, repo, &pr.head.sha).await {
        Ok(status) => state.status = status.state,
        Err(e) => {
            warn!(owner, repo, number, error = %e, "failed to fetch combined status for PR details");
        }
    }
    state
}

/// Assemble the detail view for one pull request.
///
/// Never fails: a ref whose URL has no owner/repo yields the empty detail.
pub async fn fetch_pr_details(api: &dyn GitHubApi, pr: &PrRef) -> PullRequestDetail {
    let Some((owner, repo)) = pr.owner_and_repo() else {
        warn!(url = %pr.url, "PR reference has no owner/repo");
        return PullRequestDetail::empty(pr);
    };

    let (reviews, merge) = tokio::join!(
        fetch_reviews(api, owner, repo, pr.number),
        fetch_merge_state(api, owner, repo, pr.number),
    );

    PullRequestDetail {
        url: pr.url.clone(),
        number: pr.number,
        status: merge.status,
        mergeable: merge.mergeable,
        requested_reviewers: merge.requested_reviewers,
        reviews,
    }
}

/// Assemble details for every ref concurrently, preserving input order.
///
/// Tasks live in a [`JoinSet`], so dropping the returned future aborts any
/// still in flight. A task that panics leaves its slot as the empty detail.
pub async fn fetch_all_pr_details(
    api: Arc<dyn GitHubApi>,
    refs: Vec<PrRef>,
) -> Vec<PullRequestDetail> {
    let mut slots: Vec<Option<PullRequestDetail>> = vec![None; refs.len()];
    let mut tasks = JoinSet::new();
    for (index, pr) in refs.iter().cloned().enumerate() {
        let api = api.clone();
        tasks.spawn(
            async move { (index, fetch_pr_details(api.as_ref(), &pr).await) }.in_current_span(),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, detail)) => slots[index] = Some(detail),
            Err(e) => warn!(error = %e, "PR details task failed"),
        }
    }

    slots
        .into_iter()
        .zip(refs.iter())
        .map(|(slot, pr)| slot.unwrap_or_else(|| PullRequestDetail::empty(pr)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGitHub;
    use crate::models::{GitRef, PullRequest, User};
    use std::time::Duration;

    fn pr(number: u64, sha: &str, reviewers: &[&str]) -> PullRequest {
        PullRequest {
            number,
            mergeable: Some(true),
            requested_reviewers: reviewers.iter().map(|r| User::new(*r)).collect(),
            head: GitRef {
                ref_name: format!("branch-{number}"),
                sha: sha.to_string(),
            },
            ..Default::default()
        }
    }

    fn review(id: u64) -> Review {
        Review {
            id,
            user: None,
            body: String::new(),
            state: "APPROVED".into(),
            html_url: String::new(),
            submitted_at: None,
        }
    }

    fn pr_ref(number: u64) -> PrRef {
        PrRef::new("https://api.github.com/repos/acme/widgets", number)
    }

    #[tokio::test]
    async fn assembles_all_fields() {
        let api = MockGitHub::new("octo")
            .with_pull_request(pr(1, "sha1", &["alice", "bob"]))
            .with_status("sha1", "success")
            .with_reviews(1, vec![review(10)]);

        let detail = fetch_pr_details(&api, &pr_ref(1)).await;
        assert_eq!(detail.status, "success");
        assert!(detail.mergeable);
        assert_eq!(detail.requested_reviewers, vec!["alice", "bob"]);
        assert_eq!(detail.reviews.len(), 1);
        assert!(api
            .calls()
            .contains(&"combined_status acme/widgets@sha1".to_string()));
    }

    #[tokio::test]
    async fn status_failure_keeps_pr_fields() {
        let api = MockGitHub::new("octo").with_pull_request(pr(1, "missing", &["alice"]));

        let detail = fetch_pr_details(&api, &pr_ref(1)).await;
        assert_eq!(detail.status, "");
        assert!(detail.mergeable);
        assert_eq!(detail.requested_reviewers, vec!["alice"]);
    }

    #[tokio::test]
    async fn reviews_failure_degrades_only_reviews() {
        let api = MockGitHub::new("octo")
            .with_pull_request(pr(1, "sha1", &[]))
            .with_status("sha1", "pending")
            .with_reviews_failure(1);

        let detail = fetch_pr_details(&api, &pr_ref(1)).await;
        assert!(detail.reviews.is_empty());
        assert_eq!(detail.status, "pending");
    }

    #[tokio::test]
    async fn unparseable_url_yields_empty_detail() {
        let api = MockGitHub::new("octo");
        let detail = fetch_pr_details(&api, &PrRef::new("nope", 3)).await;
        assert_eq!(detail, PullRequestDetail::empty(&PrRef::new("nope", 3)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_preserves_order_and_isolates_failures() {
        let api = MockGitHub::new("octo")
            .with_pull_request(pr(1, "sha1", &["a"]))
            .with_pull_request(pr(3, "sha3", &["c"]))
            .with_pull_request_failure(2)
            .with_status("sha1", "success")
            .with_status("sha3", "failure")
            .with_reviews(1, vec![review(1)])
            .with_reviews(2, vec![review(2)])
            .with_reviews(3, vec![review(3)])
            .with_delay(1, Duration::from_millis(300))
            .with_delay(3, Duration::from_millis(10));
        let api: Arc<dyn GitHubApi> = Arc::new(api);

        let refs = vec![pr_ref(1), pr_ref(2), pr_ref(3)];
        let details = fetch_all_pr_details(api, refs).await;

        assert_eq!(details.len(), 3);
        assert_eq!(
            details.iter().map(|d| d.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(details[0].status, "success");
        assert_eq!(details[1].status, "");
        assert!(!details[1].mergeable);
        assert!(details[1].requested_reviewers.is_empty());
        assert_eq!(details[1].reviews.len(), 1);
        assert_eq!(details[2].status, "failure");
        assert_eq!(details[2].requested_reviewers, vec!["c"]);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let api: Arc<dyn GitHubApi> = Arc::new(MockGitHub::new("octo"));
        assert!(fetch_all_pr_details(api, Vec::new()).await.is_empty());
    }
}

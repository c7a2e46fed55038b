//! Unread notifications and the daily "to do" summary.

use std::fmt::Write as _;

use hublink_github::models::{Issue, Notification};
use hublink_github::queries;
use hublink_github::{GitHubApi, GitHubError};
use serde::Serialize;

const REASON_SUBSCRIBED: &str = "subscribed";

/// A notification as returned to the webapp, with a browsable link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadNotification {
    #[serde(flatten)]
    pub notification: Notification,
    pub html_url: String,
}

fn in_org(owner: &str, org: Option<&str>) -> bool {
    match org {
        Some(org) => owner.eq_ignore_ascii_case(org),
        None => true,
    }
}

/// Drop notifications the user only watches and those outside `org`.
pub fn unread_notifications(
    notifications: Vec<Notification>,
    org: Option<&str>,
) -> Vec<UnreadNotification> {
    notifications
        .into_iter()
        .filter(|n| n.reason != REASON_SUBSCRIBED)
        .filter(|n| in_org(n.owner_login(), org))
        .map(|n| {
            let subject_url = n.subject.url.clone().unwrap_or_default();
            let issue_number = queries::last_path_segment(&subject_url).to_string();
            let target = n
                .subject
                .latest_comment_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or(subject_url);
            UnreadNotification {
                html_url: queries::notification_html_url(&target, &issue_number),
                notification: n,
            }
        })
        .collect()
}

/// Whether there is anything worth a reminder.
pub async fn has_unreads(
    api: &dyn GitHubApi,
    username: &str,
    org: Option<&str>,
) -> Result<bool, GitHubError> {
    let unreads = unread_notifications(api.list_notifications().await?, org);
    if !unreads.is_empty() {
        return Ok(true);
    }
    if !api
        .search_issues(&queries::review_requests(username, org))
        .await?
        .is_empty()
    {
        return Ok(true);
    }
    Ok(!api
        .search_issues(&queries::assignments(username, org))
        .await?
        .is_empty())
}

fn issue_section(out: &mut String, heading: &str, empty: &str, noun: &str, issues: &[Issue]) {
    let _ = writeln!(out, "##### {heading}");
    if issues.is_empty() {
        let _ = writeln!(out, "{empty}");
    } else {
        let _ = writeln!(out, "You have {} {noun}:", issues.len());
        for issue in issues {
            let _ = writeln!(out, "* [{}]({})", issue.title, issue.html_url);
        }
    }
    out.push('\n');
}

/// Markdown summary of unreads, review requests, open PRs and assignments.
pub async fn build_todo(
    api: &dyn GitHubApi,
    username: &str,
    org: Option<&str>,
) -> Result<String, GitHubError> {
    let unreads = unread_notifications(api.list_notifications().await?, org);
    let reviews = api
        .search_issues(&queries::review_requests(username, org))
        .await?;
    let open_prs = api
        .search_issues(&queries::open_pull_requests(username, org))
        .await?;
    let assignments = api
        .search_issues(&queries::assignments(username, org))
        .await?;

    let mut out = String::new();
    let _ = writeln!(out, "##### Unread Messages");
    if unreads.is_empty() {
        let _ = writeln!(out, "You don't have any unread messages.");
    } else {
        let _ = writeln!(out, "You have {} unread messages:", unreads.len());
        for unread in &unreads {
            let _ = writeln!(
                out,
                "* {}: [{}]({})",
                unread.notification.repository.full_name,
                unread.notification.subject.title,
                unread.html_url
            );
        }
    }
    out.push('\n');

    issue_section(
        &mut out,
        "Review Requests",
        "You don't have any pull requests awaiting your review.",
        "pull requests awaiting your review",
        &reviews,
    );
    issue_section(
        &mut out,
        "Your Open Pull Requests",
        "You don't have any open pull requests.",
        "open pull requests",
        &open_prs,
    );
    issue_section(
        &mut out,
        "Your Assignments",
        "You don't have any assignments.",
        "assignments",
        &assignments,
    );

    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_github::mock::MockGitHub;
    use hublink_github::models::{NotificationRepository, NotificationSubject, User};

    fn notification(reason: &str, owner: &str, url: &str, comment: Option<&str>) -> Notification {
        Notification {
            id: "1".into(),
            reason: reason.into(),
            unread: true,
            subject: NotificationSubject {
                title: "Fix it".into(),
                url: Some(url.into()),
                latest_comment_url: comment.map(str::to_string),
                kind: "Issue".into(),
            },
            repository: NotificationRepository {
                full_name: format!("{owner}/repo"),
                owner: Some(User::new(owner)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn filters_subscribed_and_foreign_orgs() {
        let items = unread_notifications(
            vec![
                notification("mention", "acme", "https://api.github.com/repos/acme/repo/issues/4", None),
                notification("subscribed", "acme", "https://api.github.com/repos/acme/repo/issues/5", None),
                notification("mention", "other", "https://api.github.com/repos/other/repo/issues/6", None),
            ],
            Some("acme"),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].html_url, "https://github.com/acme/repo/issues/4");
    }

    #[test]
    fn comment_url_points_at_anchor() {
        let items = unread_notifications(
            vec![notification(
                "comment",
                "acme",
                "https://api.github.com/repos/acme/repo/issues/4",
                Some("https://api.github.com/repos/acme/repo/issues/comments/99"),
            )],
            None,
        );
        assert_eq!(
            items[0].html_url,
            "https://github.com/acme/repo/issues/4#issuecomment-99"
        );
    }

    #[test]
    fn unread_serializes_flat() {
        let items = unread_notifications(
            vec![notification("mention", "acme", "https://api.github.com/repos/acme/repo/pulls/2", None)],
            None,
        );
        let json = serde_json::to_value(&items[0]).unwrap();
        assert_eq!(json["reason"], "mention");
        assert_eq!(json["html_url"], "https://github.com/acme/repo/pull/2");
    }

    #[tokio::test]
    async fn todo_lists_each_section() {
        let review = Issue {
            title: "Review me".into(),
            html_url: "https://github.com/acme/repo/pull/1".into(),
            ..Default::default()
        };
        let api = MockGitHub::new("octo").with_search(queries::review_requests("octo", None), vec![review]);
        let text = build_todo(&api, "octo", None).await.unwrap();
        assert!(text.contains("You don't have any unread messages."));
        assert!(text.contains("You have 1 pull requests awaiting your review:"));
        assert!(text.contains("* [Review me](https://github.com/acme/repo/pull/1)"));
        assert!(text.contains("You don't have any assignments."));
    }

    #[tokio::test]
    async fn has_unreads_checks_reviews_and_assignments() {
        let api = MockGitHub::new("octo");
        assert!(!has_unreads(&api, "octo", None).await.unwrap());

        let api = MockGitHub::new("octo").with_search(
            queries::assignments("octo", None),
            vec![Issue::default()],
        );
        assert!(has_unreads(&api, "octo", None).await.unwrap());
    }

    #[tokio::test]
    async fn search_failure_propagates() {
        let api = MockGitHub::new("octo").with_search_failure(502);
        let err = build_todo(&api, "octo", None).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }
}

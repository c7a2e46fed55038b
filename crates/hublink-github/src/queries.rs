//! Search query strings and small text transforms applied to GitHub payloads.

use std::sync::OnceLock;

use regex::Regex;

fn with_org(query: String, org: Option<&str>) -> String {
    match org.map(str::trim).filter(|o| !o.is_empty()) {
        Some(org) => format!("{query} org:{org}"),
        None => query,
    }
}

pub fn mentions(username: &str, org: Option<&str>) -> String {
    with_org(format!("is:open mentions:{username} archived:false"), org)
}

pub fn review_requests(username: &str, org: Option<&str>) -> String {
    with_org(
        format!("is:pr is:open review-requested:{username} archived:false"),
        org,
    )
}

pub fn open_pull_requests(username: &str, org: Option<&str>) -> String {
    with_org(format!("is:pr is:open author:{username} archived:false"), org)
}

pub fn assignments(username: &str, org: Option<&str>) -> String {
    with_org(format!("is:open archived:false assignee:{username}"), org)
}

pub fn issue_search(term: &str, org: Option<&str>) -> String {
    with_org(format!("is:open is:issue archived:false {term}"), org)
}

fn html_comment_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--[\S\s]+?-->").ok())
        .as_ref()
}

/// Remove `<!-- ... -->` blocks, which issue templates leave in bodies.
pub fn strip_html_comments(body: &str) -> String {
    match html_comment_re() {
        Some(re) => re.replace_all(body, "").into_owned(),
        None => body.to_string(),
    }
}

/// Turn a notification subject's API URL into the page a human would open.
///
/// `issue_number` is used for comment URLs, which GitHub reports under
/// `/issues/comments/<id>`; the result points at the comment anchor on the
/// issue page instead.
pub fn notification_html_url(subject_url: &str, issue_number: &str) -> String {
    subject_url
        .replacen("api.", "", 1)
        .replacen("repos/", "", 1)
        .replacen("/pulls/", "/pull/", 1)
        .replacen("/commits/", "/commit/", 1)
        .replacen("/api/v3", "", 1)
        .replacen("comments/", &format!("{issue_number}#issuecomment-"), 1)
}

/// Trailing path segment of a URL; for a notification subject URL this is the
/// issue or PR number.
pub fn last_path_segment(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

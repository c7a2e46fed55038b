use thiserror::Error;

/// Errors surfaced while talking to GitHub.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitHubError {
    /// GitHub answered with a non-success status.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Networking failed before a response arrived.
    #[error("network error talking to GitHub: {0}")]
    Network(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode GitHub response: {0}")]
    Decode(String),

    /// The upstream returned a next-page cursor that does not advance.
    #[error("invalid pagination: {0}")]
    Pagination(String),

    /// The OAuth endpoint rejected the request.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// A URL or header could not be built from configuration.
    #[error("invalid GitHub configuration: {0}")]
    Config(String),
}

impl GitHubError {
    /// Upstream HTTP status, when GitHub produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GitHubError::Decode(e.to_string())
        } else {
            GitHubError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_api_errors() {
        let err = GitHubError::Api {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());
        assert_eq!(GitHubError::Network("down".into()).status(), None);
        assert!(!GitHubError::Decode("bad".into()).is_not_found());
    }

    #[test]
    fn display_includes_status() {
        let err = GitHubError::Api {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "GitHub API error (502): bad gateway");
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing authorization code")]
    MissingCode,

    #[error("missing stored state")]
    MissingState,

    #[error("missing stored state: {0}")]
    Lookup(String),

    #[error("error deleting stored state: {0}")]
    DeleteFailed(String),

    #[error("invalid state token")]
    InvalidToken,

    #[error("not authorized, incorrect user")]
    WrongUser,
}

/// Anti-forgery record for one in-flight OAuth handshake.
///
/// Stored under its own token with a short TTL and consumed exactly once by
/// the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeState {
    pub user_id: String,
    pub token: String,
    pub private_allowed: bool,
}

impl HandshakeState {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>, private_allowed: bool) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            private_allowed,
        }
    }

    /// Check a consumed record against the callback's `state` parameter and
    /// the authenticated caller.
    pub fn validate(&self, state_token: &str, caller_id: &str) -> Result<(), HandshakeError> {
        if self.token != state_token {
            return Err(HandshakeError::InvalidToken);
        }
        if self.user_id != caller_id {
            return Err(HandshakeError::WrongUser);
        }
        Ok(())
    }
}

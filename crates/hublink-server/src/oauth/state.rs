use std::sync::Arc;
use std::time::Duration;

use hublink_core::{HandshakeError, HandshakeState};
use hublink_store::{oauth_state_key, set_json, take_json, KvStore, StoreError};
use rand::Rng;
use tracing::warn;

/// Lifetime of an unconsumed handshake record.
pub const STATE_TTL: Duration = Duration::from_secs(600);

const STATE_TOKEN_LEN: usize = 15;

/// Random base62 token used as the OAuth `state` parameter.
pub fn generate_state_token() -> String {
    const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..STATE_TOKEN_LEN)
        .map(|_| BASE62[rng.gen_range(0..BASE62.len())] as char)
        .collect()
}

/// Single-use handshake records keyed by state token.
#[derive(Clone)]
pub struct OAuthStateStore {
    kv: Arc<dyn KvStore>,
}

impl OAuthStateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn begin(&self, user_id: &str, private: bool) -> Result<HandshakeState, StoreError> {
        let state = HandshakeState::new(user_id, generate_state_token(), private);
        set_json(
            self.kv.as_ref(),
            &oauth_state_key(&state.token),
            &state,
            Some(STATE_TTL),
        )
        .await?;
        Ok(state)
    }

    /// Remove and return the record for `token`.
    ///
    /// The record is gone after this returns, whatever the caller's
    /// validation later decides. Concurrent calls for one token see it once.
    pub async fn complete(&self, token: &str) -> Result<HandshakeState, HandshakeError> {
        match take_json::<HandshakeState>(self.kv.as_ref(), &oauth_state_key(token)).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(HandshakeError::MissingState),
            Err(StoreError::Delete(e)) => {
                warn!(error = %e, "failed to delete OAuth state");
                Err(HandshakeError::DeleteFailed(e))
            }
            Err(e) => {
                warn!(error = %e, "failed to read OAuth state");
                Err(HandshakeError::Lookup(e.to_string()))
            }
        }
    }
}

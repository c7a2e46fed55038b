//! Persistence of linked identities, with the OAuth token encrypted at rest.

use std::sync::Arc;

use aes_gcm::{Aes256Gcm, Key};
use bytes::Bytes;
use hublink_core::LinkedIdentity;
use hublink_store::{
    get_json, identity_key, private_repo_notice_key, set_json, username_key, KvStore, StoreError,
};
use thiserror::Error;

use crate::crypto::{self, CryptoError};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("token encryption failed: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Clone)]
pub struct IdentityStore {
    kv: Arc<dyn KvStore>,
}

impl IdentityStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(
        &self,
        user_id: &str,
        key: &Key<Aes256Gcm>,
    ) -> Result<Option<LinkedIdentity>, IdentityError> {
        let Some(mut identity) =
            get_json::<LinkedIdentity>(self.kv.as_ref(), &identity_key(user_id)).await?
        else {
            return Ok(None);
        };
        identity.token.access_token = crypto::decrypt(key, &identity.token.access_token)?;
        Ok(Some(identity))
    }

    pub async fn store(
        &self,
        identity: &LinkedIdentity,
        key: &Key<Aes256Gcm>,
    ) -> Result<(), IdentityError> {
        let mut sealed = identity.clone();
        sealed.token.access_token = crypto::encrypt(key, &identity.token.access_token)?;
        set_json(self.kv.as_ref(), &identity_key(&identity.user_id), &sealed, None).await?;
        Ok(())
    }

    pub async fn store_username_mapping(
        &self,
        github_username: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.kv
            .set(
                &username_key(github_username),
                Bytes::copy_from_slice(user_id.as_bytes()),
                None,
            )
            .await
    }

    pub async fn user_for_github_username(
        &self,
        github_username: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .kv
            .get(&username_key(github_username))
            .await?
            .map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    pub async fn private_notice_sent(&self, user_id: &str) -> Result<bool, StoreError> {
        self.kv.exists(&private_repo_notice_key(user_id)).await
    }

    pub async fn mark_private_notice_sent(&self, user_id: &str) -> Result<(), StoreError> {
        self.kv
            .set(&private_repo_notice_key(user_id), Bytes::from_static(b"1"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_from_secret;
    use hublink_core::OAuthToken;
    use hublink_store::MemoryStore;

    fn store() -> (IdentityStore, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        (IdentityStore::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn token_is_encrypted_at_rest() {
        let (identities, kv) = store();
        let key = key_from_secret("k");
        let identity = LinkedIdentity::new("u1", OAuthToken::bearer("gho_secret"), "octo", false, 1);
        identities.store(&identity, &key).await.unwrap();

        let raw = kv.get("u1_githubtoken").await.unwrap().unwrap();
        let raw = String::from_utf8(raw.to_vec()).unwrap();
        assert!(!raw.contains("gho_secret"));
        assert!(raw.contains("octo"));

        let back = identities.get("u1", &key).await.unwrap().unwrap();
        assert_eq!(back, identity);
    }

    #[tokio::test]
    async fn missing_identity_is_none() {
        let (identities, _) = store();
        assert!(identities
            .get("nobody", &key_from_secret("k"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn wrong_key_is_crypto_error() {
        let (identities, _) = store();
        let identity = LinkedIdentity::new("u1", OAuthToken::bearer("t"), "octo", false, 1);
        identities.store(&identity, &key_from_secret("a")).await.unwrap();
        let err = identities.get("u1", &key_from_secret("b")).await.unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }

    #[tokio::test]
    async fn username_mapping_and_notice_flag() {
        let (identities, _) = store();
        identities.store_username_mapping("octo", "u1").await.unwrap();
        assert_eq!(
            identities.user_for_github_username("octo").await.unwrap(),
            Some("u1".to_string())
        );

        assert!(!identities.private_notice_sent("u1").await.unwrap());
        identities.mark_private_notice_sent("u1").await.unwrap();
        assert!(identities.private_notice_sent("u1").await.unwrap());
    }
}

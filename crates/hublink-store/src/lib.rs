mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Internal(String),

    /// A value was read but could not be removed afterwards.
    #[error("delete failed: {0}")]
    Delete(String),
}

/// Key-value storage for small records, with optional expiry.
///
/// Each call touches exactly one key; no multi-key transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Expired and absent keys both yield `None`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write (create or overwrite) a value. `ttl` of `None` never expires.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a value. No-op if absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Read and remove a value. Stores that can do both in one step must
    /// override this; at most one concurrent caller may then see `Some`.
    async fn take(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        self.delete(key)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        Ok(Some(value))
    }
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("decode {key}: {e}"))),
        None => Ok(None),
    }
}

/// Remove a JSON value and decode it. The value is gone even if decoding fails.
pub async fn take_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.take(key).await? {
        Some(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("decode {key}: {e}"))),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value)
        .map_err(|e| StoreError::Serialization(format!("encode {key}: {e}")))?;
    store.set(key, Bytes::from(data), ttl).await
}

// -- Key helpers --

pub fn oauth_state_key(token: &str) -> String {
    format!("githuboauthkey_{token}")
}

pub fn identity_key(user_id: &str) -> String {
    format!("{user_id}_githubtoken")
}

pub fn username_key(github_username: &str) -> String {
    format!("{github_username}_githubusername")
}

pub fn private_repo_notice_key(user_id: &str) -> String {
    format!("{user_id}_githubprivate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn key_helpers_produce_expected_keys() {
        assert_eq!(oauth_state_key("abc"), "githuboauthkey_abc");
        assert_eq!(identity_key("u1"), "u1_githubtoken");
        assert_eq!(username_key("octocat"), "octocat_githubusername");
        assert_eq!(private_repo_notice_key("u1"), "u1_githubprivate");
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_helpers_roundtrip() {
        let store = MemoryStore::new();
        let record = Record {
            name: "x".into(),
            count: 3,
        };
        set_json(&store, "rec", &record, None).await.unwrap();
        let back: Option<Record> = get_json(&store, "rec").await.unwrap();
        assert_eq!(back, Some(record));
    }

    #[tokio::test]
    async fn get_json_missing_is_none() {
        let store = MemoryStore::new();
        let back: Option<Record> = get_json(&store, "nope").await.unwrap();
        assert!(back.is_none());
    }

    #[tokio::test]
    async fn get_json_reports_corrupt_value() {
        let store = MemoryStore::new();
        store.set("rec", Bytes::from("not json"), None).await.unwrap();
        let err = get_json::<Record>(&store, "rec").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert!(err.to_string().contains("rec"));
    }
}

//! In-memory fakes and a fully wired router for route tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use hublink_core::{LinkedIdentity, OAuthToken};
use hublink_github::mock::{MockConnector, MockGitHub};
use hublink_github::oauth::{OAuthProvider, OAuthSettings};
use hublink_github::GitHubError;
use hublink_store::MemoryStore;
use serde_json::Value;

use crate::config::{ConfigService, Configuration, SharedConfig};
use crate::platform::{Attachment, ChatUser, Messenger, PlatformApi, PlatformError, Post};
use crate::routes::{build_router, AppState, InnerAppState, Timeouts};

type DirectMessage = (String, String, Vec<Attachment>);
type Event = (String, Value, String);

/// Chat platform that records everything sent through it.
#[derive(Default)]
pub struct RecordingPlatform {
    dms: Mutex<Vec<DirectMessage>>,
    posts: Mutex<Vec<Post>>,
    ephemerals: Mutex<Vec<(String, Post)>>,
    events: Mutex<Vec<Event>>,
    known_posts: Mutex<HashMap<String, Post>>,
    known_users: Mutex<HashMap<String, ChatUser>>,
}

fn snapshot<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    items.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

impl RecordingPlatform {
    pub fn insert_post(&self, post: Post) {
        self.known_posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(post.id.clone(), post);
    }

    pub fn insert_user(&self, user: ChatUser) {
        self.known_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id.clone(), user);
    }

    pub fn dms(&self) -> Vec<DirectMessage> {
        snapshot(&self.dms)
    }

    pub fn posts(&self) -> Vec<Post> {
        snapshot(&self.posts)
    }

    pub fn ephemerals(&self) -> Vec<(String, Post)> {
        snapshot(&self.ephemerals)
    }

    pub fn events(&self) -> Vec<Event> {
        snapshot(&self.events)
    }
}

#[async_trait]
impl Messenger for RecordingPlatform {
    async fn direct_message(
        &self,
        user_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), PlatformError> {
        self.dms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), text.to_string(), attachments));
        Ok(())
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, PlatformError> {
        let mut posts = self.posts.lock().unwrap_or_else(PoisonError::into_inner);
        post.id = format!("post-{}", posts.len() + 1);
        posts.push(post.clone());
        Ok(post)
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError> {
        self.ephemerals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), post));
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for RecordingPlatform {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, PlatformError> {
        Ok(self
            .known_posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(post_id)
            .cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<ChatUser>, PlatformError> {
        Ok(self
            .known_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }

    async fn publish_event(
        &self,
        event: &str,
        payload: Value,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), payload, user_id.to_string()));
        Ok(())
    }
}

/// Hands out `token-<code>`; the code `bad` is rejected.
#[derive(Debug, Default)]
pub struct FakeOAuth;

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn authorize_url(
        &self,
        settings: &OAuthSettings,
        state: &str,
        private: bool,
    ) -> Result<String, GitHubError> {
        let scope = if private { "repo" } else { "public_repo" };
        Ok(format!(
            "{}/login/oauth/authorize?client_id={}&state={state}&scope={scope}",
            settings.base_url.trim_end_matches('/'),
            settings.client_id
        ))
    }

    async fn exchange_code(
        &self,
        _settings: &OAuthSettings,
        code: &str,
    ) -> Result<OAuthToken, GitHubError> {
        if code == "bad" {
            return Err(GitHubError::OAuth("bad_verification_code".into()));
        }
        Ok(OAuthToken::bearer(format!("token-{code}")))
    }
}

pub fn test_configuration() -> Configuration {
    Configuration {
        github_oauth_client_id: "client-id".into(),
        github_oauth_client_secret: "client-secret".into(),
        encryption_key: "0123456789abcdef0123456789abcdef".into(),
        site_url: "https://chat.test".into(),
        ..Default::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub github: Arc<MockGitHub>,
    pub connector: Arc<MockConnector>,
    pub platform: Arc<RecordingPlatform>,
    pub kv: Arc<MemoryStore>,
    pub config: Arc<SharedConfig>,
}

impl TestApp {
    pub fn config_snapshot(&self) -> Arc<Configuration> {
        self.config.get_configuration()
    }
}

pub fn test_app(github: MockGitHub) -> TestApp {
    test_app_with_timeouts(github, Timeouts::default())
}

pub fn test_app_with_timeouts(github: MockGitHub, timeouts: Timeouts) -> TestApp {
    let github = Arc::new(github);
    let connector = Arc::new(MockConnector::new(github.clone()));
    let platform = Arc::new(RecordingPlatform::default());
    let kv = Arc::new(MemoryStore::new());
    let config = Arc::new(SharedConfig::new(test_configuration()));

    let state: AppState = Arc::new(
        InnerAppState::new(
            config.clone(),
            kv.clone(),
            connector.clone(),
            Arc::new(FakeOAuth),
            platform.clone(),
            platform.clone(),
        )
        .with_timeouts(timeouts),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        github,
        connector,
        platform,
        kv,
        config,
    }
}

/// Store a linked identity for `user_id` as if the OAuth flow had run.
pub async fn link_user(app: &TestApp, user_id: &str, login: &str) -> LinkedIdentity {
    let identity = LinkedIdentity::new(
        user_id,
        OAuthToken::bearer(format!("token-{user_id}")),
        login,
        false,
        Utc::now().timestamp_millis(),
    );
    let key = app.state.encryption_key();
    app.state
        .identities
        .store(&identity, &key)
        .await
        .unwrap_or_else(|e| panic!("storing identity for {user_id}: {e}"));
    app.state
        .identities
        .store_username_mapping(login, user_id)
        .await
        .unwrap_or_else(|e| panic!("storing username mapping for {login}: {e}"));
    identity
}

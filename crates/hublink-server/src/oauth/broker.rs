//! Fan-out of OAuth completion outcomes to the waiters started by `connect`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::platform::{Attachment, Messenger};

/// Result of one OAuth completion: `Err` carries the message shown to the user.
pub type Outcome = Result<(), String>;

pub const TIMEOUT_MESSAGE: &str =
    "Timed out waiting for OAuth connection. Please check if the SiteURL is correct.";

const INTERRUPTED_MESSAGE: &str = "OAuth completion was interrupted";

/// One waiter's registration. Receives at most one outcome.
pub struct Subscription {
    user_id: String,
    id: u64,
    rx: mpsc::Receiver<Outcome>,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `None` once the broker has closed or the subscription was removed.
    pub async fn recv(&mut self) -> Option<Outcome> {
        self.rx.recv().await
    }
}

type Senders = Vec<(u64, mpsc::Sender<Outcome>)>;

#[derive(Default)]
pub struct OAuthBroker {
    channels: Mutex<HashMap<String, Senders>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl OAuthBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Checked under the lock so a concurrent close cannot miss this sender.
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.closed.load(Ordering::Acquire) {
            channels
                .entry(user_id.to_string())
                .or_default()
                .push((id, tx));
        }
        drop(channels);
        Subscription {
            user_id: user_id.to_string(),
            id,
            rx,
        }
    }

    /// Deliver `outcome` to every current subscription of `user_id` without
    /// blocking. Returns how many subscriptions accepted it.
    pub fn publish(&self, user_id: &str, outcome: Outcome) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = channels.get(user_id) else {
            return 0;
        };
        senders
            .iter()
            .filter(|(_, tx)| tx.try_send(outcome.clone()).is_ok())
            .count()
    }

    pub fn unsubscribe(&self, sub: &Subscription) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = channels.get_mut(&sub.user_id) {
            senders.retain(|(id, _)| *id != sub.id);
            if senders.is_empty() {
                channels.remove(&sub.user_id);
            }
        }
    }

    /// Drop every sender so outstanding waiters wake with `None`.
    pub fn close(&self) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::Release);
        channels.clear();
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map_or(0, Vec::len)
    }
}

/// Publishes exactly one outcome for a user when dropped.
///
/// If no outcome was set the completion was cut short (cancelled or
/// panicked) and an error is published instead.
pub struct PublishGuard {
    broker: Arc<OAuthBroker>,
    user_id: String,
    outcome: Option<Outcome>,
}

impl PublishGuard {
    pub fn new(broker: Arc<OAuthBroker>, user_id: impl Into<String>) -> Self {
        Self {
            broker,
            user_id: user_id.into(),
            outcome: None,
        }
    }

    pub fn set(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(INTERRUPTED_MESSAGE.to_string()));
        let delivered = self.broker.publish(&self.user_id, outcome);
        debug!(user_id = %self.user_id, delivered, "published OAuth outcome");
    }
}

pub fn failure_text(message: &str) -> String {
    format!(
        "There was an error connecting to your GitHub: `{message}` Please double check your configuration."
    )
}

/// Wait for the outcome of a connect attempt and DM the user on failure.
///
/// Always unsubscribes before returning.
pub async fn wait_for_completion(
    broker: Arc<OAuthBroker>,
    messenger: Arc<dyn Messenger>,
    mut sub: Subscription,
    wait: Duration,
) {
    let received = tokio::time::timeout(wait, sub.recv()).await;
    broker.unsubscribe(&sub);

    let message = match received {
        Ok(Some(Ok(()))) => {
            debug!(user_id = %sub.user_id, "OAuth connection completed");
            return;
        }
        Ok(Some(Err(message))) => message,
        Ok(None) => {
            info!(user_id = %sub.user_id, "OAuth broker closed before completion");
            return;
        }
        Err(_) => TIMEOUT_MESSAGE.to_string(),
    };

    warn!(user_id = %sub.user_id, error = %message, "OAuth connection failed");
    let attachment = Attachment::danger(failure_text(&message));
    if let Err(e) = messenger
        .direct_message(&sub.user_id, "", vec![attachment])
        .await
    {
        warn!(error = %e, "failed to DM OAuth failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformError, Post};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Dms(Mutex<Vec<(String, Vec<Attachment>)>>);

    impl Dms {
        fn sent(&self) -> Vec<(String, Vec<Attachment>)> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Messenger for Dms {
        async fn direct_message(
            &self,
            user_id: &str,
            _text: &str,
            attachments: Vec<Attachment>,
        ) -> Result<(), PlatformError> {
            self.0.lock().unwrap().push((user_id.to_string(), attachments));
            Ok(())
        }

        async fn create_post(&self, post: Post) -> Result<Post, PlatformError> {
            Ok(post)
        }

        async fn send_ephemeral_post(&self, _: &str, _: Post) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_current_subscriber_once() {
        let broker = OAuthBroker::new();
        let mut subs: Vec<_> = (0..3).map(|_| broker.subscribe("u1")).collect();
        let other = broker.subscribe("u2");

        assert_eq!(broker.publish("u1", Ok(())), 3);
        for sub in &mut subs {
            assert_eq!(sub.recv().await, Some(Ok(())));
        }

        let late = broker.subscribe("u1");
        assert_eq!(broker.subscriber_count("u1"), 4);
        broker.unsubscribe(&late);
        assert_eq!(broker.subscriber_count("u2"), 1);
        broker.unsubscribe(&other);
        assert_eq!(broker.subscriber_count("u2"), 0);
    }

    #[tokio::test]
    async fn late_subscriber_sees_nothing() {
        let broker = OAuthBroker::new();
        assert_eq!(broker.publish("u1", Err("boom".into())), 0);
        let mut sub = broker.subscribe("u1");
        let got = tokio::time::timeout(Duration::from_millis(20), sub.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_without_blocking() {
        let broker = OAuthBroker::new();
        let mut sub = broker.subscribe("u1");
        assert_eq!(broker.publish("u1", Err("first".into())), 1);
        assert_eq!(broker.publish("u1", Err("second".into())), 0);
        assert_eq!(sub.recv().await, Some(Err("first".into())));
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_subscription() {
        let broker = OAuthBroker::new();
        let a = broker.subscribe("u1");
        let mut b = broker.subscribe("u1");
        broker.unsubscribe(&a);
        broker.unsubscribe(&a);
        assert_eq!(broker.publish("u1", Ok(())), 1);
        assert_eq!(b.recv().await, Some(Ok(())));
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let broker = OAuthBroker::new();
        let mut sub = broker.subscribe("u1");
        broker.close();
        assert_eq!(sub.recv().await, None);
        let mut after = broker.subscribe("u1");
        assert_eq!(after.recv().await, None);
    }

    #[test]
    fn subscribe_racing_close_never_leaves_a_live_sender() {
        use tokio::sync::mpsc::error::TryRecvError;

        for _ in 0..200 {
            let broker = Arc::new(OAuthBroker::new());
            let subscriber = {
                let broker = broker.clone();
                std::thread::spawn(move || {
                    (0..50).map(|_| broker.subscribe("u1")).collect::<Vec<_>>()
                })
            };
            let closer = {
                let broker = broker.clone();
                std::thread::spawn(move || broker.close())
            };
            closer.join().unwrap();
            let mut subs = subscriber.join().unwrap();

            assert_eq!(broker.subscriber_count("u1"), 0);
            for sub in &mut subs {
                assert_eq!(sub.rx.try_recv(), Err(TryRecvError::Disconnected));
            }
        }
    }

    #[tokio::test]
    async fn guard_publishes_set_outcome() {
        let broker = Arc::new(OAuthBroker::new());
        let mut sub = broker.subscribe("u1");
        {
            let mut guard = PublishGuard::new(broker.clone(), "u1");
            guard.set(Err("invalid state token".into()));
        }
        assert_eq!(sub.recv().await, Some(Err("invalid state token".into())));
    }

    #[tokio::test]
    async fn guard_without_outcome_publishes_error() {
        let broker = Arc::new(OAuthBroker::new());
        let mut sub = broker.subscribe("u1");
        drop(PublishGuard::new(broker.clone(), "u1"));
        assert!(matches!(sub.recv().await, Some(Err(_))));
    }

    #[tokio::test]
    async fn waiter_success_sends_no_dm() {
        let broker = Arc::new(OAuthBroker::new());
        let dms = Arc::new(Dms::default());
        let sub = broker.subscribe("u1");
        let waiter = tokio::spawn(wait_for_completion(
            broker.clone(),
            dms.clone(),
            sub,
            Duration::from_secs(45),
        ));
        tokio::task::yield_now().await;
        broker.publish("u1", Ok(()));
        waiter.await.unwrap();
        assert!(dms.sent().is_empty());
        assert_eq!(broker.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn waiter_failure_sends_danger_dm() {
        let broker = Arc::new(OAuthBroker::new());
        let dms = Arc::new(Dms::default());
        let sub = broker.subscribe("u1");
        broker.publish("u1", Err("missing stored state".into()));
        wait_for_completion(broker.clone(), dms.clone(), sub, Duration::from_secs(45)).await;

        let sent = dms.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u1");
        assert_eq!(sent[0].1[0].text, failure_text("missing stored state"));
        assert_eq!(sent[0].1[0].color, crate::platform::COLOR_DANGER);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_timeout_reports_site_url_hint() {
        let broker = Arc::new(OAuthBroker::new());
        let dms = Arc::new(Dms::default());
        let sub = broker.subscribe("u1");
        wait_for_completion(broker.clone(), dms.clone(), sub, Duration::from_secs(45)).await;

        let sent = dms.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1[0].text.contains(TIMEOUT_MESSAGE));
        assert_eq!(broker.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn waiter_on_closed_broker_sends_no_dm() {
        let broker = Arc::new(OAuthBroker::new());
        let dms = Arc::new(Dms::default());
        let sub = broker.subscribe("u1");
        broker.close();
        wait_for_completion(broker, dms.clone(), sub, Duration::from_secs(45)).await;
        assert!(dms.sent().is_empty());
    }
}

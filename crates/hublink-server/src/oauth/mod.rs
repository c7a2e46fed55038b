pub mod broker;
pub mod state;

pub use broker::{wait_for_completion, OAuthBroker, Outcome, PublishGuard, Subscription};
pub use state::{generate_state_token, OAuthStateStore, STATE_TTL};

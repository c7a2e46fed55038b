pub mod handshake;
pub mod identity;
pub mod pull_request;
pub mod reminder;

pub use handshake::{HandshakeError, HandshakeState};
pub use identity::{LinkedIdentity, OAuthToken, SidebarButtons, UserSettings};
pub use pull_request::{PrRef, PullRequestDetail, Review};

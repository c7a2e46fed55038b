//! GitHub REST access for hublink: a narrow client trait, its reqwest
//! implementation, and the read-aggregation helpers built on top of it.

pub mod aggregate;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod models;
pub mod oauth;
pub mod pagination;
pub mod queries;
pub mod repos;

pub use client::{
    api_base_url, web_base_url, GitHubApi, GitHubConnector, HttpConnector, HttpGitHubClient,
};
pub use error::GitHubError;
pub use pagination::{collect_pages, Page, PageRequest, DEFAULT_PER_PAGE};

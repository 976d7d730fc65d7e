//! Upstream data source boundary.

mod github;

use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{ContribLensError, Result};

pub use github::GitHubClient;

/// Kinds of resources a stage can request from the upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Params: `full_name`
    Repository,
    /// Params: `full_name`
    RepositoryLanguages,
    /// Params: `login`
    User,
    /// Params: `full_name`, `number`
    PullRequest,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Repository => "repository",
            Self::RepositoryLanguages => "repository-languages",
            Self::User => "user",
            Self::PullRequest => "pull-request",
        };
        f.write_str(name)
    }
}

/// Named request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams(IndexMap<String, String>);

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn require(&self, kind: ResourceKind, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            ContribLensError::Api(format!("missing parameter '{key}' for {kind} request"))
        })
    }
}

/// Fetches raw JSON payloads from the upstream version-control host.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, kind: ResourceKind, params: &FetchParams) -> Result<serde_json::Value>;
}

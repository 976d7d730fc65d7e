//! Entities extracted from version-control payloads and the records derived
//! from them.

mod raw;
mod records;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use raw::{RawCommit, RawPayload, RawPullRequest, RawRepository, RawUser};
pub use records::{
    CommitFrequency, CommitStatisticsRecord, ContributorCounts, ContributorRankingRecord,
    ContributorRepository, ContributorStatisticsRecord, ForkStatistics, MergeRequestStatisticsRecord,
    RankingComponents, RawMetrics, Relationships, RepositoryStatisticsRecord, SizeCategory,
    StarHistory,
};

/// A source-hosted repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    /// Primary language as reported upstream
    pub language: Option<String>,
    /// Bytes of code per language
    #[serde(default)]
    pub languages: IndexMap<String, u64>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Contributor count reported upstream, when known
    pub contributor_count: Option<u64>,
    /// Instants at which stars were received, when the upstream exposes them
    #[serde(default)]
    pub star_events: Vec<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// A user account that authors commits or merge requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub followers: u64,
    pub following: u64,
    pub public_repos: u64,
    #[serde(default)]
    pub top_languages: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A pull/merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: u64,
    pub number: u64,
    pub repository_id: Option<u64>,
    pub author_id: Option<u64>,
    pub title: String,
    /// `open` or `closed`
    pub state: String,
    pub merged: bool,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub comments: u64,
    pub review_comments: u64,
    /// Contributor ids involved in the request, author included
    #[serde(default)]
    pub participants: Vec<u64>,
    #[serde(default)]
    pub commit_shas: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl MergeRequest {
    pub fn changes(&self) -> u64 {
        self.additions + self.deletions
    }
}

/// A single commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub repository_id: Option<u64>,
    pub author_id: Option<u64>,
    pub message: String,
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
    pub merge_request_id: Option<u64>,
    pub authored_at: Option<DateTime<Utc>>,
}

impl Commit {
    pub fn changes(&self) -> u64 {
        self.additions + self.deletions
    }
}

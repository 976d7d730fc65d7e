use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{
    Commit, CommitStatisticsRecord, Contributor, ContributorRankingRecord,
    ContributorStatisticsRecord, MergeRequest, MergeRequestStatisticsRecord, Relationships,
    Repository, RepositoryStatisticsRecord,
};

/// Counters accumulated over one run. Stages only ever add to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub payloads_processed: usize,
    pub repositories_extracted: usize,
    pub contributors_extracted: usize,
    pub merge_requests_extracted: usize,
    pub commits_extracted: usize,
    pub entities_loaded: usize,
    pub entities_enriched: usize,
    pub relationships_built: usize,
    pub repositories_analyzed: usize,
    pub commits_analyzed: usize,
    pub merge_requests_analyzed: usize,
    pub contributors_analyzed: usize,
    pub contributors_ranked: usize,
    pub efficiency_updates: usize,
    pub records_persisted: usize,
    pub items_failed: usize,
    pub stages_completed: usize,
}

impl RunStats {
    /// Adds every counter of `other` onto `self`.
    pub fn absorb(&mut self, other: &RunStats) {
        self.payloads_processed += other.payloads_processed;
        self.repositories_extracted += other.repositories_extracted;
        self.contributors_extracted += other.contributors_extracted;
        self.merge_requests_extracted += other.merge_requests_extracted;
        self.commits_extracted += other.commits_extracted;
        self.entities_loaded += other.entities_loaded;
        self.entities_enriched += other.entities_enriched;
        self.relationships_built += other.relationships_built;
        self.repositories_analyzed += other.repositories_analyzed;
        self.commits_analyzed += other.commits_analyzed;
        self.merge_requests_analyzed += other.merge_requests_analyzed;
        self.contributors_analyzed += other.contributors_analyzed;
        self.contributors_ranked += other.contributors_ranked;
        self.efficiency_updates += other.efficiency_updates;
        self.records_persisted += other.records_persisted;
        self.items_failed += other.items_failed;
        self.stages_completed += other.stages_completed;
    }
}

/// A non-fatal failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: String,
    pub message: String,
    pub cause: Option<String>,
    /// Identifies the failing item, when the failure is per item
    pub item_id: Option<String>,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stage)?;
        if let Some(item_id) = &self.item_id {
            write!(f, " item {item_id}:")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

/// Context fields a stage may require before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    RawData,
    Relationships,
}

impl ContextField {
    pub fn is_present(self, ctx: &PipelineContext) -> bool {
        match self {
            Self::RawData => ctx.raw_data.is_some(),
            Self::Relationships => ctx.relationships.is_some(),
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RawData => "raw_data",
            Self::Relationships => "relationships",
        };
        f.write_str(name)
    }
}

/// Data carried through one pipeline run.
///
/// Created per invocation and owned by exactly one run; stages mutate it in
/// sequence and the caller reads it back when the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    /// Reference instant for trailing windows and ranking timestamps
    pub as_of: DateTime<Utc>,
    /// Payload or array of payloads to extract from
    pub raw_data: Option<serde_json::Value>,
    pub repositories: Vec<Repository>,
    pub contributors: Vec<Contributor>,
    pub merge_requests: Vec<MergeRequest>,
    pub commits: Vec<Commit>,
    pub repository_statistics: IndexMap<u64, RepositoryStatisticsRecord>,
    pub commit_statistics: IndexMap<String, CommitStatisticsRecord>,
    pub merge_request_statistics: IndexMap<u64, MergeRequestStatisticsRecord>,
    pub contributor_statistics: IndexMap<u64, ContributorStatisticsRecord>,
    pub relationships: Option<Relationships>,
    pub rankings: Option<Vec<ContributorRankingRecord>>,
    pub stats: RunStats,
    pub errors: Vec<StageError>,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl PipelineContext {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            raw_data: None,
            repositories: Vec::new(),
            contributors: Vec::new(),
            merge_requests: Vec::new(),
            commits: Vec::new(),
            repository_statistics: IndexMap::new(),
            commit_statistics: IndexMap::new(),
            merge_request_statistics: IndexMap::new(),
            contributor_statistics: IndexMap::new(),
            relationships: None,
            rankings: None,
            stats: RunStats::default(),
            errors: Vec::new(),
        }
    }

    pub fn with_raw_data(mut self, raw: serde_json::Value) -> Self {
        self.raw_data = Some(raw);
        self
    }

    pub fn with_repositories(mut self, repositories: Vec<Repository>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn with_contributors(mut self, contributors: Vec<Contributor>) -> Self {
        self.contributors = contributors;
        self
    }

    pub fn with_merge_requests(mut self, merge_requests: Vec<MergeRequest>) -> Self {
        self.merge_requests = merge_requests;
        self
    }

    pub fn with_commits(mut self, commits: Vec<Commit>) -> Self {
        self.commits = commits;
        self
    }

    pub fn record_error(&mut self, error: StageError) {
        self.stats.items_failed += usize::from(error.item_id.is_some());
        self.errors.push(error);
    }

    pub fn repository(&self, id: u64) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.id == id)
    }

    /// Payload items to extract, in input order.
    pub fn raw_items(&self) -> Vec<&serde_json::Value> {
        match &self.raw_data {
            Some(serde_json::Value::Array(items)) => items.iter().collect(),
            Some(item) => vec![item],
            None => Vec::new(),
        }
    }
}

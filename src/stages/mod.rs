//! Built-in pipeline stages.

mod commit_stats;
mod contributor_stats;
mod efficiency;
mod enrichment;
mod extraction;
mod load;
mod merge_request_stats;
mod persistence;
mod ranking;
mod relationship;
mod repository_stats;

pub use commit_stats::CommitStatisticsStage;
pub use contributor_stats::ContributorStatisticsStage;
pub use efficiency::EfficiencyUpdateStage;
pub use enrichment::EnrichmentStage;
pub use extraction::ExtractionStage;
pub use load::StoreLoadStage;
pub use merge_request_stats::MergeRequestStatisticsStage;
pub use persistence::PersistenceStage;
pub use ranking::RankingStage;
pub use relationship::RelationshipStage;
pub use repository_stats::RepositoryStatisticsStage;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Commit, MergeRequest};

/// Commits belonging to `mr`, by explicit link or by sha.
pub(crate) fn linked_commits<'a>(
    mr: &'a MergeRequest,
    commits: &'a [Commit],
) -> impl Iterator<Item = &'a Commit> + 'a {
    commits.iter().filter(move |c| {
        c.merge_request_id == Some(mr.id) || mr.commit_shas.iter().any(|sha| *sha == c.sha)
    })
}

/// True if `at` lies in the `days`-long window ending at `as_of`.
pub(crate) fn within_window(at: DateTime<Utc>, as_of: DateTime<Utc>, days: u32) -> bool {
    at <= as_of && at > as_of - Duration::days(i64::from(days))
}

use std::collections::HashSet;

use log::{debug, info};

use crate::error::Result;
use crate::models::{Commit, Contributor, ContributorStatisticsRecord, MergeRequest};
use crate::pipeline::{ContextField, PipelineContext, StageConfig};

/// Aggregates each contributor's commits and merge requests.
#[derive(Debug, Clone)]
pub struct ContributorStatisticsStage {
    pub config: StageConfig,
}

impl ContributorStatisticsStage {
    pub const NAME: &'static str = "contributor-statistics";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        for contributor in &ctx.contributors {
            let record = contributor_statistics(contributor, &ctx.commits, &ctx.merge_requests);
            debug!(
                "Contributor {} impact score {:.1}",
                contributor.login, record.impact_score
            );
            ctx.contributor_statistics.insert(contributor.id, record);
            ctx.stats.contributors_analyzed += 1;
        }
        info!("Analyzed {} contributors", ctx.contributors.len());
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn impact_score(commits: usize, lines_changed: u64, merged: usize, repositories: usize) -> f64 {
    let score = 10.0 * (1.0 + commits as f64).ln()
        + 5.0 * (1.0 + lines_changed as f64).ln()
        + 4.0 * merged as f64
        + 2.0 * repositories as f64;
    score.min(100.0)
}

#[allow(clippy::cast_precision_loss)]
pub fn contributor_statistics(
    contributor: &Contributor,
    commits: &[Commit],
    merge_requests: &[MergeRequest],
) -> ContributorStatisticsRecord {
    let own_commits: Vec<&Commit> = commits
        .iter()
        .filter(|c| c.author_id == Some(contributor.id))
        .collect();
    let own_merge_requests: Vec<&MergeRequest> = merge_requests
        .iter()
        .filter(|m| m.author_id == Some(contributor.id))
        .collect();

    let lines_added: u64 = own_commits.iter().map(|c| c.additions).sum();
    let lines_removed: u64 = own_commits.iter().map(|c| c.deletions).sum();
    let lines_changed = lines_added + lines_removed;

    let repositories: HashSet<u64> = own_commits
        .iter()
        .filter_map(|c| c.repository_id)
        .chain(own_merge_requests.iter().filter_map(|m| m.repository_id))
        .collect();

    let timestamps: Vec<_> = own_commits.iter().filter_map(|c| c.authored_at).collect();
    let active_days: HashSet<_> = timestamps.iter().map(|at| at.date_naive()).collect();

    let merged = own_merge_requests.iter().filter(|m| m.merged).count();

    ContributorStatisticsRecord {
        contributor_id: contributor.id,
        total_commits: own_commits.len(),
        lines_added,
        lines_removed,
        repositories_contributed: repositories.len(),
        merge_requests_opened: own_merge_requests.len(),
        merge_requests_merged: merged,
        active_days: active_days.len(),
        average_commit_size: if own_commits.is_empty() {
            0.0
        } else {
            lines_changed as f64 / own_commits.len() as f64
        },
        first_contribution_at: timestamps.iter().min().copied(),
        last_contribution_at: timestamps.iter().max().copied(),
        impact_score: impact_score(own_commits.len(), lines_changed, merged, repositories.len()),
    }
}

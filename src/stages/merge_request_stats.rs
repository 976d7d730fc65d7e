use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::info;

use super::linked_commits;
use crate::error::Result;
use crate::models::{Commit, MergeRequest, MergeRequestStatisticsRecord};
use crate::pipeline::{ContextField, PipelineContext, StageConfig};
use crate::scoring::components::merge_request_efficiency;

#[derive(Debug, Clone)]
pub struct MergeRequestStatisticsStage {
    pub config: StageConfig,
}

impl MergeRequestStatisticsStage {
    pub const NAME: &'static str = "merge-request-statistics";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        for mr in &ctx.merge_requests {
            ctx.merge_request_statistics
                .insert(mr.id, merge_request_statistics(mr, &ctx.commits));
            ctx.stats.merge_requests_analyzed += 1;
        }
        info!("Analyzed {} merge requests", ctx.merge_requests.len());
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<f64> {
    let (from, to) = (from?, to?);
    Some((to - from).num_seconds().max(0) as f64 / 3600.0)
}

/// Distinct participants, author included.
pub fn participant_count(mr: &MergeRequest) -> usize {
    let distinct: HashSet<u64> = mr.participants.iter().copied().chain(mr.author_id).collect();
    distinct.len()
}

pub fn merge_request_statistics(mr: &MergeRequest, commits: &[Commit]) -> MergeRequestStatisticsRecord {
    let (linked, linked_changes) = linked_commits(mr, commits)
        .fold((0, 0), |(count, changes), c| (count + 1, changes + c.changes()));

    let cycle_time_hours = if mr.merged {
        hours_between(mr.created_at, mr.merged_at)
    } else {
        None
    };

    MergeRequestStatisticsRecord {
        merge_request_id: mr.id,
        repository_id: mr.repository_id,
        author_id: mr.author_id,
        state: mr.state.clone(),
        size: mr.changes(),
        cycle_time_hours,
        time_to_close_hours: hours_between(mr.created_at, mr.closed_at.or(mr.merged_at)),
        participant_count: participant_count(mr),
        review_comments: mr.review_comments,
        linked_commits: linked,
        linked_commit_changes: linked_changes,
        efficiency: merge_request_efficiency(mr.changes(), linked_changes),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::stages::fixtures;
    use chrono::Duration;

    #[test]
    fn merged_request_has_cycle_time_and_efficiency() {
        let created = fixtures::as_of() - Duration::hours(30);
        let mut mr = fixtures::merge_request(9, 1, 7, 80);
        mr.merged = true;
        mr.created_at = Some(created);
        mr.merged_at = Some(created + Duration::hours(6));
        mr.commit_shas = vec!["b".into()];

        let mut linked = fixtures::commit("a", 1, 7, 50, 0);
        linked.merge_request_id = Some(9);
        let commits = vec![linked, fixtures::commit("b", 1, 7, 50, 0), fixtures::commit("c", 1, 7, 5, 0)];

        let record = merge_request_statistics(&mr, &commits);

        assert_eq!(record.cycle_time_hours, Some(6.0));
        assert_eq!(record.time_to_close_hours, Some(6.0));
        assert_eq!(record.linked_commits, 2);
        assert_eq!(record.linked_commit_changes, 100);
        assert_eq!(record.efficiency, 80.0);
    }

    #[test]
    fn open_request_without_commits() {
        let record = merge_request_statistics(&fixtures::merge_request(1, 1, 7, 10), &[]);
        assert_eq!(record.cycle_time_hours, None);
        assert_eq!(record.linked_commits, 0);
        assert_eq!(record.efficiency, 0.0);
    }

    #[test]
    fn author_counts_as_participant_once() {
        let mut mr = fixtures::merge_request(1, 1, 7, 10);
        mr.participants = vec![8, 9];
        assert_eq!(participant_count(&mr), 3);
        mr.participants.push(7);
        assert_eq!(participant_count(&mr), 3);
    }

    #[test]
    fn repeated_participants_count_once() {
        let mut mr = fixtures::merge_request(1, 1, 7, 10);
        mr.participants = vec![8, 8, 7, 9, 8];
        assert_eq!(participant_count(&mr), 3);

        mr.author_id = None;
        mr.participants = vec![];
        assert_eq!(participant_count(&mr), 0);
    }
}

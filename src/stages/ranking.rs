use log::info;

use super::linked_commits;
use super::merge_request_stats::participant_count;
use crate::error::{ContribLensError, Result};
use crate::models::{Contributor, RawMetrics, Relationships};
use crate::pipeline::{ContextField, PipelineContext, StageConfig, StageEnv};
use crate::scoring::{self, components, ContributorMetrics};

/// Scores every contributor in context and produces the leaderboard.
#[derive(Debug, Clone)]
pub struct RankingStage {
    pub config: StageConfig,
}

impl RankingStage {
    pub const NAME: &'static str = "ranking";
    pub const REQUIRES: &'static [ContextField] = &[ContextField::Relationships];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let relationships = ctx
            .relationships
            .as_ref()
            .ok_or_else(|| ContribLensError::MissingContext {
                stage: Self::NAME.to_string(),
                field: ContextField::Relationships.to_string(),
            })?;

        let metrics: Vec<ContributorMetrics> = ctx
            .contributors
            .iter()
            .map(|contributor| gather(ctx, relationships, contributor))
            .collect();

        let rankings = scoring::rank(&metrics, &env.settings.weights, ctx.as_of);
        if let Some(leader) = rankings.first() {
            info!(
                "Ranked {} contributors, leader {} ({:.1})",
                rankings.len(),
                leader.login,
                leader.total_score
            );
        }
        ctx.stats.contributors_ranked += rankings.len();
        ctx.rankings = Some(rankings);
        Ok(())
    }
}

fn gather(
    ctx: &PipelineContext,
    relationships: &Relationships,
    contributor: &Contributor,
) -> ContributorMetrics {
    let id = contributor.id;
    let own_commits = ctx.commits.iter().filter(|c| c.author_id == Some(id));
    let (commits, lines_added, lines_removed) = own_commits
        .fold((0, 0, 0), |(n, added, removed), c| {
            (n + 1, added + c.additions, removed + c.deletions)
        });

    let repository_ids: Vec<u64> = relationships
        .for_contributor(id)
        .map(|link| link.repository_id)
        .collect();
    let stars: Vec<u64> = repository_ids
        .iter()
        .filter_map(|repo_id| ctx.repository(*repo_id))
        .map(|repo| repo.stars)
        .collect();

    let efficiency_pairs = ctx
        .merge_requests
        .iter()
        .filter(|mr| mr.author_id == Some(id))
        .map(|mr| {
            let linked: u64 = linked_commits(mr, &ctx.commits).map(|c| c.changes()).sum();
            (mr.changes(), linked)
        })
        .collect();

    let collaborators = ctx
        .merge_requests
        .iter()
        .filter(|mr| mr.author_id == Some(id) || mr.participants.contains(&id))
        .map(participant_count)
        .max()
        .unwrap_or(1)
        .max(1);

    ContributorMetrics {
        contributor_id: id,
        login: contributor.login.clone(),
        raw: RawMetrics {
            commits,
            lines_added,
            lines_removed,
            repositories_contributed: repository_ids.len(),
            followers: contributor.followers,
        },
        efficiency_pairs,
        collaborators,
        total_stars: stars.iter().sum(),
        popular_repos: stars
            .iter()
            .filter(|s| **s >= components::POPULAR_REPO_STARS)
            .count(),
        profile_completeness: components::profile_completeness(contributor),
    }
}

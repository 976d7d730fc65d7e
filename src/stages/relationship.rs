use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::info;

use crate::error::Result;
use crate::models::{ContributorRepository, Relationships};
use crate::pipeline::{ContextField, PipelineContext, StageConfig};

/// Contributors get this many derived top languages at most.
const TOP_LANGUAGES: usize = 3;

/// Cross-links contributors and repositories from commits and merge requests.
#[derive(Debug, Clone)]
pub struct RelationshipStage {
    pub config: StageConfig,
}

impl RelationshipStage {
    pub const NAME: &'static str = "relationship";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        let mut pairs: IndexMap<(u64, u64), ContributorRepository> = IndexMap::new();

        for commit in &ctx.commits {
            let (Some(contributor_id), Some(repository_id)) = (commit.author_id, commit.repository_id)
            else {
                continue;
            };
            let entry = pair(&mut pairs, contributor_id, repository_id);
            entry.commit_count += 1;
            entry.lines_added += commit.additions;
            entry.lines_removed += commit.deletions;
            entry.lines_changed += commit.changes();
            widen(entry, commit.authored_at);
        }

        for mr in &ctx.merge_requests {
            let (Some(contributor_id), Some(repository_id)) = (mr.author_id, mr.repository_id) else {
                continue;
            };
            let entry = pair(&mut pairs, contributor_id, repository_id);
            entry.merge_request_count += 1;
            entry.merged_request_count += usize::from(mr.merged);
            widen(entry, mr.created_at);
        }

        let relationships = Relationships {
            contributor_repository: pairs.into_values().collect(),
        };
        derive_top_languages(ctx, &relationships);

        ctx.stats.relationships_built += relationships.contributor_repository.len();
        info!(
            "Built {} contributor-repository relationships",
            relationships.contributor_repository.len()
        );
        ctx.relationships = Some(relationships);
        Ok(())
    }
}

fn pair(
    pairs: &mut IndexMap<(u64, u64), ContributorRepository>,
    contributor_id: u64,
    repository_id: u64,
) -> &mut ContributorRepository {
    pairs
        .entry((contributor_id, repository_id))
        .or_insert_with(|| ContributorRepository {
            contributor_id,
            repository_id,
            commit_count: 0,
            lines_added: 0,
            lines_removed: 0,
            lines_changed: 0,
            merge_request_count: 0,
            merged_request_count: 0,
            first_contribution_at: None,
            last_contribution_at: None,
        })
}

fn widen(entry: &mut ContributorRepository, at: Option<DateTime<Utc>>) {
    let Some(at) = at else { return };
    entry.first_contribution_at = Some(entry.first_contribution_at.map_or(at, |t| t.min(at)));
    entry.last_contribution_at = Some(entry.last_contribution_at.map_or(at, |t| t.max(at)));
}

/// Gives contributors without known languages the primary languages of the
/// repositories they committed to most.
fn derive_top_languages(ctx: &mut PipelineContext, relationships: &Relationships) {
    let mut derived: Vec<(usize, Vec<String>)> = Vec::new();

    for (index, contributor) in ctx.contributors.iter().enumerate() {
        if !contributor.top_languages.is_empty() {
            continue;
        }
        let mut weights: IndexMap<String, usize> = IndexMap::new();
        for link in relationships.for_contributor(contributor.id) {
            let language = ctx
                .repository(link.repository_id)
                .and_then(|r| r.language.clone());
            if let Some(language) = language {
                *weights.entry(language).or_default() += link.commit_count.max(1);
            }
        }
        if weights.is_empty() {
            continue;
        }
        weights.sort_by(|_, a, _, b| b.cmp(a));
        derived.push((index, weights.into_keys().take(TOP_LANGUAGES).collect()));
    }

    for (index, languages) in derived {
        ctx.contributors[index].top_languages = languages;
    }
}

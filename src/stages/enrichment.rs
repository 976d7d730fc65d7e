use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use log::{debug, info};

use crate::error::{ContribLensError, Result};
use crate::models::{RawPullRequest, RawRepository, RawUser};
use crate::pipeline::{
    partition_results, record_failures, ContextField, ItemError, PipelineContext, StageConfig,
    StageEnv,
};
use crate::source::{FetchParams, ResourceKind, SourceClient};

/// Completes extracted entities with upstream details.
///
/// Requests run with at most `fan_out` in flight and results are applied in
/// entity order. A failed fetch leaves the entity as it was.
#[derive(Debug, Clone)]
pub struct EnrichmentStage {
    pub config: StageConfig,
}

impl EnrichmentStage {
    pub const NAME: &'static str = "enrichment";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let Some(source) = env.source.as_deref() else {
            info!("No upstream source configured, skipping enrichment");
            return Ok(());
        };
        let fan_out = env.settings.fan_out.max(1);

        let mut failures = self.enrich_repositories(ctx, source, fan_out).await;
        failures.extend(self.enrich_contributors(ctx, source, fan_out).await);
        failures.extend(self.enrich_merge_requests(ctx, source, fan_out).await);

        record_failures(Self::NAME, self.config, ctx, failures)?;
        info!("Enriched {} entities", ctx.stats.entities_enriched);
        Ok(())
    }

    async fn enrich_repositories(
        &self,
        ctx: &mut PipelineContext,
        source: &dyn SourceClient,
        fan_out: usize,
    ) -> Vec<ItemError> {
        let targets: Vec<(usize, u64, String)> = ctx
            .repositories
            .iter()
            .enumerate()
            .map(|(index, r)| (index, r.id, r.full_name.clone()))
            .collect();

        let results: Vec<_> = stream::iter(targets)
            .map(|(index, id, full_name)| async move {
                fetch_repository(source, &full_name)
                    .await
                    .map(|update| (index, update))
                    .map_err(|e| ItemError::new(format!("repository:{id}"), "fetch failed").caused_by(e))
            })
            .buffered(fan_out)
            .collect()
            .await;

        let (updates, failures) = partition_results(results);
        for (index, (raw, languages)) in updates {
            let repo = &mut ctx.repositories[index];
            raw.merge_into(repo);
            if !languages.is_empty() {
                repo.languages = languages;
            }
            debug!("Enriched repository {}", repo.full_name);
            ctx.stats.entities_enriched += 1;
        }
        failures
    }

    async fn enrich_contributors(
        &self,
        ctx: &mut PipelineContext,
        source: &dyn SourceClient,
        fan_out: usize,
    ) -> Vec<ItemError> {
        let targets: Vec<(usize, u64, String)> = ctx
            .contributors
            .iter()
            .enumerate()
            .map(|(index, c)| (index, c.id, c.login.clone()))
            .collect();

        let results: Vec<_> = stream::iter(targets)
            .map(|(index, id, login)| async move {
                let params = FetchParams::new().with("login", &login);
                let fetched = match source.fetch(ResourceKind::User, &params).await {
                    Ok(value) => serde_json::from_value::<RawUser>(value).map_err(ContribLensError::from),
                    Err(e) => Err(e),
                };
                fetched
                    .map(|user| (index, user))
                    .map_err(|e| ItemError::new(format!("contributor:{id}"), "fetch failed").caused_by(e))
            })
            .buffered(fan_out)
            .collect()
            .await;

        let (updates, failures) = partition_results(results);
        for (index, user) in updates {
            user.merge_into(&mut ctx.contributors[index]);
            ctx.stats.entities_enriched += 1;
        }
        failures
    }

    async fn enrich_merge_requests(
        &self,
        ctx: &mut PipelineContext,
        source: &dyn SourceClient,
        fan_out: usize,
    ) -> Vec<ItemError> {
        let targets: Vec<_> = ctx
            .merge_requests
            .iter()
            .enumerate()
            .map(|(index, mr)| {
                let full_name = mr
                    .repository_id
                    .and_then(|id| ctx.repository(id))
                    .map(|r| r.full_name.clone());
                (index, mr.id, mr.number, full_name)
            })
            .collect();

        let results: Vec<_> = stream::iter(targets)
            .map(|(index, id, number, full_name)| async move {
                let item = format!("merge-request:{id}");
                let Some(full_name) = full_name else {
                    return Err(ItemError::new(item, "repository of merge request is unknown"));
                };
                let params = FetchParams::new()
                    .with("full_name", &full_name)
                    .with("number", number);
                let fetched = match source.fetch(ResourceKind::PullRequest, &params).await {
                    Ok(value) => {
                        serde_json::from_value::<RawPullRequest>(value).map_err(ContribLensError::from)
                    }
                    Err(e) => Err(e),
                };
                fetched
                    .map(|pr| (index, pr))
                    .map_err(|e| ItemError::new(item, "fetch failed").caused_by(e))
            })
            .buffered(fan_out)
            .collect()
            .await;

        let (updates, failures) = partition_results(results);
        for (index, pr) in updates {
            pr.merge_into(&mut ctx.merge_requests[index]);
            ctx.stats.entities_enriched += 1;
        }
        failures
    }
}

async fn fetch_repository(
    source: &dyn SourceClient,
    full_name: &str,
) -> Result<(RawRepository, IndexMap<String, u64>)> {
    let params = FetchParams::new().with("full_name", full_name);
    let repository = source.fetch(ResourceKind::Repository, &params).await?;
    let repository: RawRepository = serde_json::from_value(repository)?;
    let languages = source
        .fetch(ResourceKind::RepositoryLanguages, &params)
        .await?;
    let languages: IndexMap<String, u64> = serde_json::from_value(languages)?;
    Ok((repository, languages))
}

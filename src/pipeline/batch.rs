//! Batch entry points.
//!
//! Each entry point wraps pipeline invocations and normalizes the result
//! into `{statistics, errors}`. A non-empty `errors` list means partial
//! success. This is also where run policy lives: failed runs are retried
//! with a fresh context, and entity batches are split across up to
//! `concurrency` independent runs.

use std::hash::Hash;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;

use super::context::{PipelineContext, RunStats, StageError};
use super::registry::{
    Registry, COMMIT_PIPELINE, CONTRIBUTOR_PIPELINE, INGEST_PIPELINE, MERGE_REQUEST_PIPELINE,
    REPOSITORY_PIPELINE,
};
use crate::error::Result;
use crate::models::{
    Commit, CommitStatisticsRecord, Contributor, ContributorRankingRecord,
    ContributorStatisticsRecord, MergeRequest, MergeRequestStatisticsRecord, Repository,
    RepositoryStatisticsRecord,
};

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Pipeline to run instead of the entry point's default
    pub pipeline: Option<String>,
    /// Reference instant for the run; defaults to now
    pub as_of: Option<DateTime<Utc>>,
}

impl BatchOptions {
    fn pipeline_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.pipeline.as_deref().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome<S> {
    pub statistics: S,
    pub errors: Vec<StageError>,
    pub stats: RunStats,
}

impl<S> BatchOutcome<S> {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Everything an ingest run computes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStatistics {
    pub repositories: IndexMap<u64, RepositoryStatisticsRecord>,
    pub commits: IndexMap<String, CommitStatisticsRecord>,
    pub merge_requests: IndexMap<u64, MergeRequestStatisticsRecord>,
    pub contributors: IndexMap<u64, ContributorStatisticsRecord>,
    pub rankings: Vec<ContributorRankingRecord>,
}

/// Runs `pipeline`, re-invoking it with a fresh context after a failure up
/// to the definition's `retries`. Structural errors are never retried.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub async fn run_with_retries<F>(
    registry: &Registry,
    pipeline: &str,
    make_context: F,
) -> Result<PipelineContext>
where
    F: Fn() -> PipelineContext,
{
    let attempts = registry.definition(pipeline)?.retries + 1;
    let mut attempt = 1;
    loop {
        match registry.execute(pipeline, make_context()).await {
            Ok(ctx) => return Ok(ctx),
            Err(e) if e.is_structural() || attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("Pipeline '{pipeline}' failed (attempt {attempt}/{attempts}): {e}");
                attempt += 1;
            }
        }
    }
}

/// Processes raw webhook/API payloads through the ingest pipeline.
///
/// # Errors
///
/// Returns an error if the pipeline fails fatally on every attempt.
pub async fn process_payloads(
    registry: &Registry,
    raw: serde_json::Value,
    options: &BatchOptions,
) -> Result<BatchOutcome<IngestStatistics>> {
    let as_of = options.as_of.unwrap_or_else(Utc::now);
    let pipeline = options.pipeline_or(INGEST_PIPELINE);

    let ctx = run_with_retries(registry, pipeline, || {
        PipelineContext::new(as_of).with_raw_data(raw.clone())
    })
    .await?;

    Ok(BatchOutcome {
        statistics: IngestStatistics {
            repositories: ctx.repository_statistics,
            commits: ctx.commit_statistics,
            merge_requests: ctx.merge_request_statistics,
            contributors: ctx.contributor_statistics,
            rankings: ctx.rankings.unwrap_or_default(),
        },
        errors: ctx.errors,
        stats: ctx.stats,
    })
}

/// Splits `entities` into up to `concurrency` chunks, runs one pipeline per
/// chunk and merges the statistics in chunk order.
async fn process_entities<T, K, S>(
    registry: &Registry,
    pipeline: &str,
    entities: Vec<T>,
    options: &BatchOptions,
    seed: fn(PipelineContext, Vec<T>) -> PipelineContext,
    harvest: fn(&mut PipelineContext) -> IndexMap<K, S>,
) -> Result<BatchOutcome<IndexMap<K, S>>>
where
    T: Clone,
    K: Hash + Eq,
{
    let definition = registry.definition(pipeline)?;
    let mut outcome = BatchOutcome {
        statistics: IndexMap::new(),
        errors: Vec::new(),
        stats: RunStats::default(),
    };
    if entities.is_empty() {
        return Ok(outcome);
    }

    let as_of = options.as_of.unwrap_or_else(Utc::now);
    let concurrency = definition.concurrency.max(1);
    let chunk_size = entities.len().div_ceil(concurrency);
    let chunks: Vec<Vec<T>> = entities.chunks(chunk_size).map(<[T]>::to_vec).collect();

    info!(
        "Processing {} entities through '{pipeline}' in {} chunk(s)",
        entities.len(),
        chunks.len()
    );

    let results: Vec<_> = stream::iter(chunks.into_iter().enumerate())
        .map(move |(index, chunk)| async move {
            let result = run_with_retries(registry, pipeline, || {
                seed(PipelineContext::new(as_of), chunk.clone())
            })
            .await;
            (index, result)
        })
        .buffered(concurrency)
        .collect()
        .await;

    for (index, result) in results {
        match result {
            Ok(mut ctx) => {
                outcome.statistics.extend(harvest(&mut ctx));
                outcome.errors.append(&mut ctx.errors);
                outcome.stats.absorb(&ctx.stats);
            }
            Err(e) if e.is_structural() => return Err(e),
            Err(e) => {
                warn!("Chunk {index} of '{pipeline}' failed: {e}");
                outcome.stats.items_failed += 1;
                outcome.errors.push(StageError {
                    stage: pipeline.to_string(),
                    message: e.to_string(),
                    cause: None,
                    item_id: Some(format!("chunk-{index}")),
                });
            }
        }
    }

    Ok(outcome)
}

fn single<K, S>(outcome: BatchOutcome<IndexMap<K, S>>) -> BatchOutcome<Option<S>> {
    BatchOutcome {
        statistics: outcome.statistics.into_values().next(),
        errors: outcome.errors,
        stats: outcome.stats,
    }
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_repositories(
    registry: &Registry,
    repositories: Vec<Repository>,
    options: &BatchOptions,
) -> Result<BatchOutcome<IndexMap<u64, RepositoryStatisticsRecord>>> {
    process_entities(
        registry,
        options.pipeline_or(REPOSITORY_PIPELINE),
        repositories,
        options,
        PipelineContext::with_repositories,
        |ctx| std::mem::take(&mut ctx.repository_statistics),
    )
    .await
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_repository(
    registry: &Registry,
    repository: Repository,
    options: &BatchOptions,
) -> Result<BatchOutcome<Option<RepositoryStatisticsRecord>>> {
    process_repositories(registry, vec![repository], options)
        .await
        .map(single)
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_contributors(
    registry: &Registry,
    contributors: Vec<Contributor>,
    options: &BatchOptions,
) -> Result<BatchOutcome<IndexMap<u64, ContributorStatisticsRecord>>> {
    process_entities(
        registry,
        options.pipeline_or(CONTRIBUTOR_PIPELINE),
        contributors,
        options,
        PipelineContext::with_contributors,
        |ctx| std::mem::take(&mut ctx.contributor_statistics),
    )
    .await
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_contributor(
    registry: &Registry,
    contributor: Contributor,
    options: &BatchOptions,
) -> Result<BatchOutcome<Option<ContributorStatisticsRecord>>> {
    process_contributors(registry, vec![contributor], options)
        .await
        .map(single)
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_commits(
    registry: &Registry,
    commits: Vec<Commit>,
    options: &BatchOptions,
) -> Result<BatchOutcome<IndexMap<String, CommitStatisticsRecord>>> {
    process_entities(
        registry,
        options.pipeline_or(COMMIT_PIPELINE),
        commits,
        options,
        PipelineContext::with_commits,
        |ctx| std::mem::take(&mut ctx.commit_statistics),
    )
    .await
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_commit(
    registry: &Registry,
    commit: Commit,
    options: &BatchOptions,
) -> Result<BatchOutcome<Option<CommitStatisticsRecord>>> {
    process_commits(registry, vec![commit], options)
        .await
        .map(single)
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_merge_requests(
    registry: &Registry,
    merge_requests: Vec<MergeRequest>,
    options: &BatchOptions,
) -> Result<BatchOutcome<IndexMap<u64, MergeRequestStatisticsRecord>>> {
    process_entities(
        registry,
        options.pipeline_or(MERGE_REQUEST_PIPELINE),
        merge_requests,
        options,
        PipelineContext::with_merge_requests,
        |ctx| std::mem::take(&mut ctx.merge_request_statistics),
    )
    .await
}

/// # Errors
///
/// Returns an error if the pipeline is unknown or fails structurally.
pub async fn process_merge_request(
    registry: &Registry,
    merge_request: MergeRequest,
    options: &BatchOptions,
) -> Result<BatchOutcome<Option<MergeRequestStatisticsRecord>>> {
    process_merge_requests(registry, vec![merge_request], options)
        .await
        .map(single)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContribLensError;
    use crate::pipeline::{PipelineDefinition, PipelineSettings};
    use chrono::TimeZone;
    use serde_json::json;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn options() -> BatchOptions {
        BatchOptions {
            pipeline: None,
            as_of: Some(as_of()),
        }
    }

    fn commit(sha: &str, additions: u64) -> Commit {
        Commit {
            sha: sha.to_string(),
            repository_id: Some(1),
            author_id: Some(1),
            message: "change".into(),
            additions,
            deletions: 0,
            files_changed: 1,
            merge_request_id: None,
            authored_at: Some(as_of()),
        }
    }

    #[tokio::test]
    async fn hundred_payloads_with_one_malformed_item() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let items: Vec<_> = (0..100u64)
            .map(|i| {
                if i == 50 {
                    json!({"repository": {"id": "broken", "name": 5}})
                } else {
                    json!({"repository": {"id": i + 1, "name": format!("repo{i}"), "full_name": format!("acme/repo{i}")}})
                }
            })
            .collect();

        let mut registry = registry;
        registry.register_pipeline(PipelineDefinition::new("extract-only", &["extraction"]));

        let ctx = run_with_retries(&registry, "extract-only", || {
            PipelineContext::new(as_of()).with_raw_data(json!(items.clone()))
        })
        .await
        .unwrap();

        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].item_id.as_deref(), Some("50"));
        assert_eq!(ctx.repositories.len(), 99);
        assert_eq!(ctx.stats.repositories_extracted, 99);
        assert_eq!(ctx.stats.payloads_processed, 99);
    }

    #[tokio::test]
    async fn process_commits_merges_chunks_in_order() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let commits: Vec<_> = (0..10).map(|i| commit(&format!("c{i}"), i * 10)).collect();

        let outcome = process_commits(&registry, commits, &options()).await.unwrap();

        let keys: Vec<_> = outcome.statistics.keys().cloned().collect();
        let expected: Vec<_> = (0..10).map(|i| format!("c{i}")).collect();
        assert_eq!(keys, expected);
        assert_eq!(outcome.stats.commits_analyzed, 10);
        assert!(!outcome.is_partial());
    }

    #[tokio::test]
    async fn empty_batch_skips_the_pipeline() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let outcome = process_repositories(&registry, vec![], &options())
            .await
            .unwrap();
        assert!(outcome.statistics.is_empty());
        assert_eq!(outcome.stats.stages_completed, 0);
    }

    #[tokio::test]
    async fn unknown_pipeline_option_is_a_lookup_error() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let opts = BatchOptions {
            pipeline: Some("nope".into()),
            as_of: None,
        };
        let err = process_commit(&registry, commit("a", 1), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, ContribLensError::UnknownPipeline(_)));
    }

    #[tokio::test]
    async fn process_payloads_returns_rankings_and_statistics() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let raw = json!({
            "repository": {"id": 1, "name": "widgets", "full_name": "acme/widgets", "stargazers_count": 1200},
            "sender": {"id": 7, "login": "octo"},
            "commits": [{"id": "abc", "author": {"id": 7}, "additions": 10, "deletions": 2, "timestamp": "2024-05-30T12:00:00Z"}]
        });

        let outcome = process_payloads(&registry, raw, &options()).await.unwrap();

        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.statistics.rankings.len(), 1);
        assert_eq!(outcome.statistics.rankings[0].rank_position, 1);
        assert!(outcome.statistics.repositories.contains_key(&1));
        assert!(outcome.statistics.commits.contains_key("abc"));
        assert!(outcome.statistics.contributors.contains_key(&7));
    }

    #[test]
    fn single_entity_entry_point_unwraps_the_record() {
        let registry = Registry::with_defaults(PipelineSettings::default(), None, None);
        let outcome =
            tokio_test::block_on(process_commit(&registry, commit("solo", 42), &options()))
                .unwrap();
        let record = outcome.statistics.unwrap();
        assert_eq!(record.sha, "solo");
        assert_eq!(record.lines_changed, 42);
    }
}

use std::sync::Arc;

use log::warn;

use super::context::{ContextField, PipelineContext, StageError};
use crate::error::{ContribLensError, Result};
use crate::scoring::ScoringWeights;
use crate::source::SourceClient;
use crate::stages::{
    CommitStatisticsStage, ContributorStatisticsStage, EfficiencyUpdateStage, EnrichmentStage,
    ExtractionStage, MergeRequestStatisticsStage, PersistenceStage, RankingStage,
    RelationshipStage, RepositoryStatisticsStage, StoreLoadStage,
};
use crate::store::Store;

/// Tunables shared by every stage of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Trailing window for commit frequency, in days
    pub commit_window_days: u32,
    /// Trailing window for star growth, in days
    pub star_window_days: u32,
    /// Maximum in-flight upstream requests per stage
    pub fan_out: usize,
    /// Default `abort_on_error` for stages built by the default factories
    pub abort_on_error: bool,
    pub weights: ScoringWeights,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            commit_window_days: 30,
            star_window_days: 30,
            fan_out: 4,
            abort_on_error: false,
            weights: ScoringWeights::default(),
        }
    }
}

/// Collaborators and settings a stage runs against.
#[derive(Clone, Default)]
pub struct StageEnv {
    pub settings: PipelineSettings,
    pub store: Option<Arc<dyn Store>>,
    pub source: Option<Arc<dyn SourceClient>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageConfig {
    /// Escalate the first per-item failure into a fatal error
    pub abort_on_error: bool,
}

/// Per-item failure inside a stage's batch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub item_id: String,
    pub message: String,
    pub cause: Option<String>,
}

impl ItemError {
    pub fn new(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn caused_by(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// Splits per-item results into successes and failures, keeping input order.
pub fn partition_results<T, I>(results: I) -> (Vec<T>, Vec<ItemError>)
where
    I: IntoIterator<Item = std::result::Result<T, ItemError>>,
{
    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(failure) => failures.push(failure),
        }
    }
    (successes, failures)
}

/// Records item failures on the context, or turns the first one into a fatal
/// error when the stage aborts on error.
pub fn record_failures(
    stage: &str,
    config: StageConfig,
    ctx: &mut PipelineContext,
    failures: Vec<ItemError>,
) -> Result<()> {
    if config.abort_on_error {
        if let Some(first) = failures.into_iter().next() {
            return Err(ContribLensError::ItemFailed {
                stage: stage.to_string(),
                item_id: first.item_id,
                message: first.message,
            });
        }
        return Ok(());
    }

    for failure in failures {
        warn!(
            "Stage '{stage}' skipped item {}: {}",
            failure.item_id, failure.message
        );
        ctx.record_error(StageError {
            stage: stage.to_string(),
            message: failure.message,
            cause: failure.cause,
            item_id: Some(failure.item_id),
        });
    }
    Ok(())
}

/// One unit of pipeline work.
#[derive(Debug, Clone)]
pub enum Stage {
    Extraction(ExtractionStage),
    Enrichment(EnrichmentStage),
    StoreLoad(StoreLoadStage),
    Relationship(RelationshipStage),
    RepositoryStatistics(RepositoryStatisticsStage),
    CommitStatistics(CommitStatisticsStage),
    MergeRequestStatistics(MergeRequestStatisticsStage),
    ContributorStatistics(ContributorStatisticsStage),
    Ranking(RankingStage),
    EfficiencyUpdate(EfficiencyUpdateStage),
    Persistence(PersistenceStage),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extraction(_) => ExtractionStage::NAME,
            Self::Enrichment(_) => EnrichmentStage::NAME,
            Self::StoreLoad(_) => StoreLoadStage::NAME,
            Self::Relationship(_) => RelationshipStage::NAME,
            Self::RepositoryStatistics(_) => RepositoryStatisticsStage::NAME,
            Self::CommitStatistics(_) => CommitStatisticsStage::NAME,
            Self::MergeRequestStatistics(_) => MergeRequestStatisticsStage::NAME,
            Self::ContributorStatistics(_) => ContributorStatisticsStage::NAME,
            Self::Ranking(_) => RankingStage::NAME,
            Self::EfficiencyUpdate(_) => EfficiencyUpdateStage::NAME,
            Self::Persistence(_) => PersistenceStage::NAME,
        }
    }

    pub fn config(&self) -> StageConfig {
        match self {
            Self::Extraction(s) => s.config,
            Self::Enrichment(s) => s.config,
            Self::StoreLoad(s) => s.config,
            Self::Relationship(s) => s.config,
            Self::RepositoryStatistics(s) => s.config,
            Self::CommitStatistics(s) => s.config,
            Self::MergeRequestStatistics(s) => s.config,
            Self::ContributorStatistics(s) => s.config,
            Self::Ranking(s) => s.config,
            Self::EfficiencyUpdate(s) => s.config,
            Self::Persistence(s) => s.config,
        }
    }

    pub fn requires(&self) -> &'static [ContextField] {
        match self {
            Self::Extraction(_) => ExtractionStage::REQUIRES,
            Self::Enrichment(_) => EnrichmentStage::REQUIRES,
            Self::StoreLoad(_) => StoreLoadStage::REQUIRES,
            Self::Relationship(_) => RelationshipStage::REQUIRES,
            Self::RepositoryStatistics(_) => RepositoryStatisticsStage::REQUIRES,
            Self::CommitStatistics(_) => CommitStatisticsStage::REQUIRES,
            Self::MergeRequestStatistics(_) => MergeRequestStatisticsStage::REQUIRES,
            Self::ContributorStatistics(_) => ContributorStatisticsStage::REQUIRES,
            Self::Ranking(_) => RankingStage::REQUIRES,
            Self::EfficiencyUpdate(_) => EfficiencyUpdateStage::REQUIRES,
            Self::Persistence(_) => PersistenceStage::REQUIRES,
        }
    }

    fn validate(&self, ctx: &PipelineContext) -> Result<()> {
        match self.requires().iter().find(|field| !field.is_present(ctx)) {
            Some(field) => Err(ContribLensError::MissingContext {
                stage: self.name().to_string(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Validates preconditions, then transforms the context in place.
    pub async fn execute(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        self.validate(ctx)?;
        match self {
            Self::Extraction(s) => s.run(ctx),
            Self::Enrichment(s) => s.run(ctx, env).await,
            Self::StoreLoad(s) => s.run(ctx, env),
            Self::Relationship(s) => s.run(ctx),
            Self::RepositoryStatistics(s) => s.run(ctx, env),
            Self::CommitStatistics(s) => s.run(ctx),
            Self::MergeRequestStatistics(s) => s.run(ctx),
            Self::ContributorStatistics(s) => s.run(ctx),
            Self::Ranking(s) => s.run(ctx, env),
            Self::EfficiencyUpdate(s) => s.run(ctx, env),
            Self::Persistence(s) => s.run(ctx, env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keeps_order_on_both_sides() {
        let results = vec![
            Ok(1),
            Err(ItemError::new("b", "bad")),
            Ok(3),
            Err(ItemError::new("d", "worse")),
        ];
        let (ok, failed) = partition_results(results);
        assert_eq!(ok, vec![1, 3]);
        let ids: Vec<_> = failed.iter().map(|f| f.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn record_failures_appends_to_context() {
        let mut ctx = PipelineContext::default();
        record_failures(
            "extraction",
            StageConfig::default(),
            &mut ctx,
            vec![ItemError::new("4", "missing id").caused_by("serde")],
        )
        .unwrap();

        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].item_id.as_deref(), Some("4"));
        assert_eq!(ctx.errors[0].cause.as_deref(), Some("serde"));
    }

    #[test]
    fn record_failures_aborts_when_configured() {
        let mut ctx = PipelineContext::default();
        let err = record_failures(
            "extraction",
            StageConfig {
                abort_on_error: true,
            },
            &mut ctx,
            vec![ItemError::new("4", "missing id")],
        )
        .unwrap_err();

        assert!(matches!(err, ContribLensError::ItemFailed { ref item_id, .. } if item_id == "4"));
        assert!(ctx.errors.is_empty());
    }

    #[tokio::test]
    async fn missing_required_field_fails_before_running() {
        let stage = Stage::Extraction(ExtractionStage::new(StageConfig::default()));
        let mut ctx = PipelineContext::default();

        let err = stage
            .execute(&mut ctx, &StageEnv::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ContribLensError::MissingContext { ref field, .. } if field == "raw_data"
        ));
        assert_eq!(ctx.stats, Default::default());
    }
}

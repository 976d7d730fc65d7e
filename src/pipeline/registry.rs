use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::context::{PipelineContext, StageError};
use super::stage::{PipelineSettings, Stage, StageConfig, StageEnv};
use crate::error::{ContribLensError, Result};
use crate::source::SourceClient;
use crate::stages::{
    CommitStatisticsStage, ContributorStatisticsStage, EfficiencyUpdateStage, EnrichmentStage,
    ExtractionStage, MergeRequestStatisticsStage, PersistenceStage, RankingStage,
    RelationshipStage, RepositoryStatisticsStage, StoreLoadStage,
};
use crate::store::Store;

/// Builds a fresh stage for one pipeline instantiation.
pub type StageFactory = fn(&PipelineSettings) -> Stage;

/// Ordered stage list plus the run policy batch runners apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<String>,
    /// Concurrent pipeline instances a batch runner may start
    pub concurrency: usize,
    /// Extra attempts a batch runner makes after a failed run
    pub retries: u32,
}

impl PipelineDefinition {
    pub fn new(name: &str, stages: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            stages: stages.iter().map(|s| (*s).to_string()).collect(),
            concurrency: 1,
            retries: 2,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

pub const INGEST_PIPELINE: &str = "ingest";
pub const REPOSITORY_PIPELINE: &str = "repository";
pub const CONTRIBUTOR_PIPELINE: &str = "contributor";
pub const COMMIT_PIPELINE: &str = "commit";
pub const MERGE_REQUEST_PIPELINE: &str = "merge-request";
pub const RANKING_PIPELINE: &str = "ranking";
pub const EFFICIENCY_PIPELINE: &str = "efficiency";

/// Catalog of stage constructors and pipeline definitions.
///
/// Owned by the composition root and passed by reference to whatever runs
/// pipelines. Populate it before the first `execute`.
pub struct Registry {
    stages: HashMap<String, StageFactory>,
    pipelines: HashMap<String, PipelineDefinition>,
    env: StageEnv,
}

impl Registry {
    /// An empty registry running against `env`.
    pub fn new(env: StageEnv) -> Self {
        Self {
            stages: HashMap::new(),
            pipelines: HashMap::new(),
            env,
        }
    }

    /// A registry with every built-in stage and the default pipelines.
    pub fn with_defaults(
        settings: PipelineSettings,
        store: Option<Arc<dyn Store>>,
        source: Option<Arc<dyn SourceClient>>,
    ) -> Self {
        let mut registry = Self::new(StageEnv {
            settings,
            store,
            source,
        });
        registry.register_builtin_stages();
        registry.register_default_pipelines();
        registry
    }

    fn register_builtin_stages(&mut self) {
        fn config(settings: &PipelineSettings) -> StageConfig {
            StageConfig {
                abort_on_error: settings.abort_on_error,
            }
        }

        self.register_stage(ExtractionStage::NAME, |s| {
            Stage::Extraction(ExtractionStage::new(config(s)))
        });
        self.register_stage(EnrichmentStage::NAME, |s| {
            Stage::Enrichment(EnrichmentStage::new(config(s)))
        });
        self.register_stage(StoreLoadStage::NAME, |s| {
            Stage::StoreLoad(StoreLoadStage::new(config(s)))
        });
        self.register_stage(RelationshipStage::NAME, |s| {
            Stage::Relationship(RelationshipStage::new(config(s)))
        });
        self.register_stage(RepositoryStatisticsStage::NAME, |s| {
            Stage::RepositoryStatistics(RepositoryStatisticsStage::new(config(s)))
        });
        self.register_stage(CommitStatisticsStage::NAME, |s| {
            Stage::CommitStatistics(CommitStatisticsStage::new(config(s)))
        });
        self.register_stage(MergeRequestStatisticsStage::NAME, |s| {
            Stage::MergeRequestStatistics(MergeRequestStatisticsStage::new(config(s)))
        });
        self.register_stage(ContributorStatisticsStage::NAME, |s| {
            Stage::ContributorStatistics(ContributorStatisticsStage::new(config(s)))
        });
        self.register_stage(RankingStage::NAME, |s| {
            Stage::Ranking(RankingStage::new(config(s)))
        });
        self.register_stage(EfficiencyUpdateStage::NAME, |s| {
            Stage::EfficiencyUpdate(EfficiencyUpdateStage::new(config(s)))
        });
        self.register_stage(PersistenceStage::NAME, |s| {
            Stage::Persistence(PersistenceStage::new(config(s)))
        });
    }

    fn register_default_pipelines(&mut self) {
        self.register_pipeline(PipelineDefinition::new(
            INGEST_PIPELINE,
            &[
                ExtractionStage::NAME,
                EnrichmentStage::NAME,
                RelationshipStage::NAME,
                RepositoryStatisticsStage::NAME,
                CommitStatisticsStage::NAME,
                MergeRequestStatisticsStage::NAME,
                ContributorStatisticsStage::NAME,
                RankingStage::NAME,
                PersistenceStage::NAME,
            ],
        ));
        self.register_pipeline(
            PipelineDefinition::new(
                REPOSITORY_PIPELINE,
                &[
                    EnrichmentStage::NAME,
                    RepositoryStatisticsStage::NAME,
                    PersistenceStage::NAME,
                ],
            )
            .with_concurrency(4),
        );
        self.register_pipeline(
            PipelineDefinition::new(
                CONTRIBUTOR_PIPELINE,
                &[
                    EnrichmentStage::NAME,
                    ContributorStatisticsStage::NAME,
                    PersistenceStage::NAME,
                ],
            )
            .with_concurrency(4),
        );
        self.register_pipeline(
            PipelineDefinition::new(
                COMMIT_PIPELINE,
                &[CommitStatisticsStage::NAME, PersistenceStage::NAME],
            )
            .with_concurrency(4),
        );
        self.register_pipeline(
            PipelineDefinition::new(
                MERGE_REQUEST_PIPELINE,
                &[MergeRequestStatisticsStage::NAME, PersistenceStage::NAME],
            )
            .with_concurrency(4),
        );
        self.register_pipeline(PipelineDefinition::new(
            RANKING_PIPELINE,
            &[
                StoreLoadStage::NAME,
                RelationshipStage::NAME,
                ContributorStatisticsStage::NAME,
                RankingStage::NAME,
                PersistenceStage::NAME,
            ],
        ));
        self.register_pipeline(PipelineDefinition::new(
            EFFICIENCY_PIPELINE,
            &[EfficiencyUpdateStage::NAME],
        ));
    }

    /// Stores `factory` under `name`, replacing any earlier registration.
    pub fn register_stage(&mut self, name: &str, factory: StageFactory) {
        if self.stages.insert(name.to_string(), factory).is_some() {
            debug!("Stage '{name}' re-registered");
        }
    }

    pub fn register_pipeline(&mut self, definition: PipelineDefinition) {
        self.pipelines.insert(definition.name.clone(), definition);
    }

    pub fn definition(&self, name: &str) -> Result<&PipelineDefinition> {
        self.pipelines
            .get(name)
            .ok_or_else(|| ContribLensError::UnknownPipeline(name.to_string()))
    }

    /// All pipeline definitions, sorted by name.
    pub fn pipelines(&self) -> Vec<&PipelineDefinition> {
        let mut definitions: Vec<_> = self.pipelines.values().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.env.settings
    }

    /// Builds fresh stages for `definition`, failing on the first unknown name.
    fn instantiate(&self, definition: &PipelineDefinition) -> Result<Vec<Stage>> {
        definition
            .stages
            .iter()
            .map(|name| {
                self.stages
                    .get(name)
                    .map(|factory| factory(&self.env.settings))
                    .ok_or_else(|| ContribLensError::UnknownStage {
                        pipeline: definition.name.clone(),
                        stage: name.clone(),
                    })
            })
            .collect()
    }

    /// Runs `pipeline_name` over `context`, one stage after another.
    ///
    /// Every stage name is resolved before the first stage runs. A stage error
    /// aborts the run when it is structural or the stage aborts on error;
    /// otherwise it is appended to `context.errors` and the run continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline or one of its stages is unknown, or a
    /// stage fails fatally.
    pub async fn execute(
        &self,
        pipeline_name: &str,
        mut context: PipelineContext,
    ) -> Result<PipelineContext> {
        let definition = self.definition(pipeline_name)?;
        let stages = self.instantiate(definition)?;

        info!(
            "Running pipeline '{}' ({} stages)",
            definition.name,
            stages.len()
        );
        let started = Instant::now();

        for stage in &stages {
            let stage_started = Instant::now();
            match stage.execute(&mut context, &self.env).await {
                Ok(()) => {
                    context.stats.stages_completed += 1;
                    debug!(
                        "Stage '{}' finished in {:?}",
                        stage.name(),
                        stage_started.elapsed()
                    );
                }
                Err(e) if e.is_structural() || stage.config().abort_on_error => {
                    warn!("Pipeline '{}' aborted in stage '{}': {e}", definition.name, stage.name());
                    return Err(e);
                }
                Err(e) => {
                    warn!("Stage '{}' failed, continuing: {e}", stage.name());
                    context.record_error(StageError {
                        stage: stage.name().to_string(),
                        message: e.to_string(),
                        cause: None,
                        item_id: None,
                    });
                }
            }
        }

        info!(
            "Pipeline '{}' finished in {:?}: {} stages completed, {} errors",
            definition.name,
            started.elapsed(),
            context.stats.stages_completed,
            context.errors.len()
        );

        Ok(context)
    }
}

//! Pipeline orchestration: context, stage contract, registry and batch
//! entry points.

mod batch;
mod context;
mod registry;
mod stage;

pub use batch::{
    process_commit, process_commits, process_contributor, process_contributors,
    process_merge_request, process_merge_requests, process_payloads, process_repositories,
    process_repository, run_with_retries, BatchOptions, BatchOutcome, IngestStatistics,
};
pub use context::{ContextField, PipelineContext, RunStats, StageError};
pub use registry::{
    PipelineDefinition, Registry, StageFactory, COMMIT_PIPELINE, CONTRIBUTOR_PIPELINE,
    EFFICIENCY_PIPELINE, INGEST_PIPELINE, MERGE_REQUEST_PIPELINE, RANKING_PIPELINE,
    REPOSITORY_PIPELINE,
};
pub use stage::{
    partition_results, record_failures, ItemError, PipelineSettings, Stage, StageConfig, StageEnv,
};

use chrono::{Datelike, Timelike};
use log::info;

use crate::error::Result;
use crate::models::{Commit, CommitStatisticsRecord, SizeCategory};
use crate::pipeline::{ContextField, PipelineContext, StageConfig};

#[derive(Debug, Clone)]
pub struct CommitStatisticsStage {
    pub config: StageConfig,
}

impl CommitStatisticsStage {
    pub const NAME: &'static str = "commit-statistics";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        for commit in &ctx.commits {
            ctx.commit_statistics
                .insert(commit.sha.clone(), commit_statistics(commit));
            ctx.stats.commits_analyzed += 1;
        }
        info!("Analyzed {} commits", ctx.commits.len());
        Ok(())
    }
}

fn size_category(lines_changed: u64) -> SizeCategory {
    match lines_changed {
        0..=10 => SizeCategory::Small,
        11..=100 => SizeCategory::Medium,
        101..=500 => SizeCategory::Large,
        _ => SizeCategory::Huge,
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn commit_statistics(commit: &Commit) -> CommitStatisticsRecord {
    let lines_changed = commit.changes();
    let complexity =
        (lines_changed as f64 / 10.0 + commit.files_changed as f64 * 2.0).min(100.0);

    CommitStatisticsRecord {
        sha: commit.sha.clone(),
        repository_id: commit.repository_id,
        author_id: commit.author_id,
        lines_changed,
        files_changed: commit.files_changed,
        complexity_score: complexity,
        size_category: size_category(lines_changed),
        weekday: commit.authored_at.map(|at| at.weekday().to_string()),
        hour: commit.authored_at.map(|at| at.hour()),
    }
}

use log::info;

use crate::error::{ContribLensError, Result};
use crate::pipeline::{ContextField, PipelineContext, StageConfig, StageEnv};

/// Averages, per author, how closely each merge request's diff matches the
/// commits linked to it, by `merge_request_id` or by a sha listed in the
/// request's `commit_shas`. Requests without linked commits are skipped and
/// so are authors left with none.
const UPDATE_CODE_EFFICIENCY: &str = r#"
WITH pairs AS (
    SELECT mr.author_id AS author_id,
           mr.additions + mr.deletions AS pr_changes,
           SUM(c.additions + c.deletions) AS commit_changes
    FROM merge_requests mr
    JOIN commits c
      ON c.merge_request_id = mr.id
      OR c.sha IN (SELECT value FROM json_each(mr.payload, '$.commit_shas'))
    WHERE mr.author_id IS NOT NULL
    GROUP BY mr.id
)
UPDATE contributors
SET code_efficiency = (
    SELECT AVG(
        CASE
            WHEN p.commit_changes = 0 THEN 0.0
            WHEN p.pr_changes = p.commit_changes THEN 100.0
            ELSE MAX(0.0, (1.0 - ABS(p.pr_changes - p.commit_changes) * 1.0 / p.commit_changes) * 100.0)
        END
    )
    FROM pairs p
    WHERE p.author_id = contributors.id
)
WHERE id IN (SELECT author_id FROM pairs)
"#;

/// Recomputes the stored code-efficiency score of every contributor in one
/// bulk statement.
#[derive(Debug, Clone)]
pub struct EfficiencyUpdateStage {
    pub config: StageConfig,
}

impl EfficiencyUpdateStage {
    pub const NAME: &'static str = "efficiency-update";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let store = env.store.as_deref().ok_or_else(|| {
            ContribLensError::Config(format!("stage '{}' needs a store", Self::NAME))
        })?;

        let updated = store.execute(UPDATE_CODE_EFFICIENCY, &[])?;
        ctx.stats.efficiency_updates += updated;
        info!("Updated code efficiency for {updated} contributors");
        Ok(())
    }
}

//! Weighted multi-metric contributor scoring.

pub mod components;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ContribLensError, Result};
use crate::models::{ContributorRankingRecord, RankingComponents, RawMetrics};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Share of each component in the total score. Must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScoringWeights {
    pub code_volume: f64,
    pub code_efficiency: f64,
    pub commit_impact: f64,
    pub team_collaboration: f64,
    pub repository_popularity: f64,
    pub repository_influence: f64,
    pub followers: f64,
    pub profile_completeness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            code_volume: 0.05,
            code_efficiency: 0.15,
            commit_impact: 0.10,
            team_collaboration: 0.20,
            repository_popularity: 0.20,
            repository_influence: 0.10,
            followers: 0.15,
            profile_completeness: 0.05,
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> [f64; 8] {
        [
            self.code_volume,
            self.code_efficiency,
            self.commit_impact,
            self.team_collaboration,
            self.repository_popularity,
            self.repository_influence,
            self.followers,
            self.profile_completeness,
        ]
    }

    /// # Errors
    ///
    /// Returns a config error if a weight is negative or the weights do not
    /// sum to 1.
    pub fn validate(&self) -> Result<()> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ContribLensError::Config(
                "scoring weights must be non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ContribLensError::Config(format!(
                "scoring weights must sum to 1, got {sum:.6}"
            )));
        }
        Ok(())
    }

    /// Weighted sum of `components`, clamped to `[0, 100]`.
    pub fn total(&self, c: &RankingComponents) -> f64 {
        let weighted = c.code_volume * self.code_volume
            + c.code_efficiency * self.code_efficiency
            + c.commit_impact * self.commit_impact
            + c.team_collaboration * self.team_collaboration
            + c.repository_popularity * self.repository_popularity
            + c.repository_influence * self.repository_influence
            + c.followers * self.followers
            + c.profile_completeness * self.profile_completeness;
        weighted.clamp(0.0, 100.0)
    }
}

/// Per-contributor inputs gathered by the ranking stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorMetrics {
    pub contributor_id: u64,
    pub login: String,
    pub raw: RawMetrics,
    /// `(pr_changes, linked_commit_changes)` per merge request the contributor authored
    pub efficiency_pairs: Vec<(u64, u64)>,
    /// Largest participant group the contributor worked in; at least 1
    pub collaborators: usize,
    pub total_stars: u64,
    pub popular_repos: usize,
    pub profile_completeness: f64,
}

impl ContributorMetrics {
    fn total_lines(&self) -> u64 {
        self.raw.lines_added + self.raw.lines_removed
    }
}

/// Maxima across a run, used to normalize the relative components.
#[derive(Debug, Default)]
struct Maxima {
    total_lines: u64,
    commits: u64,
    repositories: u64,
    followers: u64,
}

impl Maxima {
    fn of(metrics: &[ContributorMetrics]) -> Self {
        metrics.iter().fold(Self::default(), |max, m| Self {
            total_lines: max.total_lines.max(m.total_lines()),
            commits: max.commits.max(m.raw.commits as u64),
            repositories: max.repositories.max(m.raw.repositories_contributed as u64),
            followers: max.followers.max(m.raw.followers),
        })
    }
}

fn score_components(m: &ContributorMetrics, max: &Maxima) -> RankingComponents {
    RankingComponents {
        code_volume: components::relative_score(m.total_lines(), max.total_lines),
        code_efficiency: components::code_efficiency(&m.efficiency_pairs),
        commit_impact: components::relative_score(m.raw.commits as u64, max.commits),
        team_collaboration: components::team_collaboration(m.collaborators),
        repository_popularity: components::repository_popularity(m.total_stars, m.popular_repos),
        repository_influence: components::relative_score(
            m.raw.repositories_contributed as u64,
            max.repositories,
        ),
        followers: components::relative_score(m.raw.followers, max.followers),
        profile_completeness: m.profile_completeness,
    }
}

/// Scores every contributor and assigns dense positions `1..=n` by total
/// score, descending. Equal totals keep their input order.
pub fn rank(
    metrics: &[ContributorMetrics],
    weights: &ScoringWeights,
    calculated_at: DateTime<Utc>,
) -> Vec<ContributorRankingRecord> {
    let max = Maxima::of(metrics);

    let mut scored: Vec<(f64, RankingComponents, &ContributorMetrics)> = metrics
        .iter()
        .map(|m| {
            let components = score_components(m, &max);
            (weights.total(&components), components, m)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (total_score, components, m))| ContributorRankingRecord {
            contributor_id: m.contributor_id,
            login: m.login.clone(),
            rank_position: index + 1,
            total_score,
            components,
            raw_metrics: m.raw.clone(),
            calculation_timestamp: calculated_at,
        })
        .collect()
}

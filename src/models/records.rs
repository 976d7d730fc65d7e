use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitFrequency {
    pub window_days: u32,
    pub commits_in_window: usize,
    pub daily_average: f64,
    /// Commits per weekday, Monday first
    pub by_weekday: [usize; 7],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarHistory {
    pub window_days: u32,
    pub current_stars: u64,
    /// Stars gained inside the window; estimated from the lifetime average
    /// when no star events are known
    pub new_stars: f64,
    pub daily_average: f64,
    /// Whether `new_stars` comes from recorded star events
    pub observed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkStatistics {
    pub total_forks: u64,
    pub forks_per_star: f64,
    pub activity_tier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorCounts {
    pub observed: usize,
    pub reported: Option<u64>,
    pub effective: u64,
    pub active_in_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStatisticsRecord {
    pub repository_id: u64,
    pub commit_frequency: CommitFrequency,
    pub star_history: StarHistory,
    pub fork_statistics: ForkStatistics,
    pub contributor_counts: ContributorCounts,
    /// Percentage of code per language
    pub language_breakdown: IndexMap<String, f64>,
    pub health_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    Huge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStatisticsRecord {
    pub sha: String,
    pub repository_id: Option<u64>,
    pub author_id: Option<u64>,
    pub lines_changed: u64,
    pub files_changed: u64,
    pub complexity_score: f64,
    pub size_category: SizeCategory,
    pub weekday: Option<String>,
    pub hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequestStatisticsRecord {
    pub merge_request_id: u64,
    pub repository_id: Option<u64>,
    pub author_id: Option<u64>,
    pub state: String,
    pub size: u64,
    pub cycle_time_hours: Option<f64>,
    pub time_to_close_hours: Option<f64>,
    pub participant_count: usize,
    pub review_comments: u64,
    pub linked_commits: usize,
    pub linked_commit_changes: u64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorStatisticsRecord {
    pub contributor_id: u64,
    pub total_commits: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub repositories_contributed: usize,
    pub merge_requests_opened: usize,
    pub merge_requests_merged: usize,
    pub active_days: usize,
    pub average_commit_size: f64,
    pub first_contribution_at: Option<DateTime<Utc>>,
    pub last_contribution_at: Option<DateTime<Utc>>,
    pub impact_score: f64,
}

/// Aggregate contribution of one contributor to one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorRepository {
    pub contributor_id: u64,
    pub repository_id: u64,
    pub commit_count: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub lines_changed: u64,
    pub merge_request_count: usize,
    pub merged_request_count: usize,
    pub first_contribution_at: Option<DateTime<Utc>>,
    pub last_contribution_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationships {
    pub contributor_repository: Vec<ContributorRepository>,
}

impl Relationships {
    pub fn for_contributor(&self, contributor_id: u64) -> impl Iterator<Item = &ContributorRepository> {
        self.contributor_repository
            .iter()
            .filter(move |pair| pair.contributor_id == contributor_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingComponents {
    pub code_volume: f64,
    pub code_efficiency: f64,
    pub commit_impact: f64,
    pub team_collaboration: f64,
    pub repository_popularity: f64,
    pub repository_influence: f64,
    pub followers: f64,
    pub profile_completeness: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub commits: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub repositories_contributed: usize,
    pub followers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorRankingRecord {
    pub contributor_id: u64,
    pub login: String,
    pub rank_position: usize,
    pub total_score: f64,
    pub components: RankingComponents,
    pub raw_metrics: RawMetrics,
    pub calculation_timestamp: DateTime<Utc>,
}

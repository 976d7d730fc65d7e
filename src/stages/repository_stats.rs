use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use log::{debug, info};

use super::within_window;
use crate::error::Result;
use crate::models::{
    Commit, CommitFrequency, ContributorCounts, ForkStatistics, Repository,
    RepositoryStatisticsRecord, StarHistory,
};
use crate::pipeline::{ContextField, PipelineContext, PipelineSettings, StageConfig, StageEnv};

const BASE_HEALTH: f64 = 50.0;

/// Computes activity, popularity and health for every repository in context.
#[derive(Debug, Clone)]
pub struct RepositoryStatisticsStage {
    pub config: StageConfig,
}

impl RepositoryStatisticsStage {
    pub const NAME: &'static str = "repository-statistics";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let records: Vec<RepositoryStatisticsRecord> = ctx
            .repositories
            .iter()
            .map(|repo| {
                let commits: Vec<&Commit> = ctx
                    .commits
                    .iter()
                    .filter(|c| c.repository_id == Some(repo.id))
                    .collect();
                repository_statistics(repo, &commits, &env.settings, ctx.as_of)
            })
            .collect();

        for record in records {
            debug!(
                "Repository {} health score {:.1}",
                record.repository_id, record.health_score
            );
            ctx.repository_statistics.insert(record.repository_id, record);
            ctx.stats.repositories_analyzed += 1;
        }
        info!("Analyzed {} repositories", ctx.repositories.len());
        Ok(())
    }
}

pub fn repository_statistics(
    repo: &Repository,
    commits: &[&Commit],
    settings: &PipelineSettings,
    as_of: DateTime<Utc>,
) -> RepositoryStatisticsRecord {
    let commit_frequency = commit_frequency(commits, settings.commit_window_days, as_of);
    let star_history = star_history(repo, settings.star_window_days, as_of);
    let contributor_counts =
        contributor_counts(repo, commits, settings.commit_window_days, as_of);
    let language_breakdown = language_breakdown(repo);

    let health_score = health_score(
        commit_frequency.daily_average,
        star_history.daily_average,
        contributor_counts.effective,
        language_breakdown.len(),
    );

    RepositoryStatisticsRecord {
        repository_id: repo.id,
        commit_frequency,
        star_history,
        fork_statistics: fork_statistics(repo),
        contributor_counts,
        language_breakdown,
        health_score,
    }
}

#[allow(clippy::cast_precision_loss)]
fn commit_frequency(commits: &[&Commit], window_days: u32, as_of: DateTime<Utc>) -> CommitFrequency {
    let mut by_weekday = [0usize; 7];
    let mut commits_in_window = 0;
    for at in commits.iter().filter_map(|c| c.authored_at) {
        if within_window(at, as_of, window_days) {
            commits_in_window += 1;
            by_weekday[at.weekday().num_days_from_monday() as usize] += 1;
        }
    }

    CommitFrequency {
        window_days,
        commits_in_window,
        daily_average: commits_in_window as f64 / f64::from(window_days.max(1)),
        by_weekday,
    }
}

#[allow(clippy::cast_precision_loss)]
fn star_history(repo: &Repository, window_days: u32, as_of: DateTime<Utc>) -> StarHistory {
    let window = f64::from(window_days.max(1));

    if !repo.star_events.is_empty() {
        let new_stars = repo
            .star_events
            .iter()
            .filter(|at| within_window(**at, as_of, window_days))
            .count() as f64;
        return StarHistory {
            window_days,
            current_stars: repo.stars,
            new_stars,
            daily_average: new_stars / window,
            observed: true,
        };
    }

    // Without star events, fall back to the lifetime average.
    let daily_average = match repo.created_at {
        Some(created) => {
            let age_days = (as_of - created).num_days().max(1) as f64;
            repo.stars as f64 / age_days
        }
        None => 0.0,
    };
    StarHistory {
        window_days,
        current_stars: repo.stars,
        new_stars: daily_average * window,
        daily_average,
        observed: false,
    }
}

#[allow(clippy::cast_precision_loss)]
fn fork_statistics(repo: &Repository) -> ForkStatistics {
    let activity_tier = match repo.forks {
        0 => "none",
        1..=9 => "low",
        10..=99 => "moderate",
        100..=999 => "high",
        _ => "very-high",
    };
    ForkStatistics {
        total_forks: repo.forks,
        forks_per_star: if repo.stars == 0 {
            0.0
        } else {
            repo.forks as f64 / repo.stars as f64
        },
        activity_tier: activity_tier.to_string(),
    }
}

fn contributor_counts(
    repo: &Repository,
    commits: &[&Commit],
    window_days: u32,
    as_of: DateTime<Utc>,
) -> ContributorCounts {
    let observed: HashSet<u64> = commits.iter().filter_map(|c| c.author_id).collect();
    let active: HashSet<u64> = commits
        .iter()
        .filter(|c| c.authored_at.is_some_and(|at| within_window(at, as_of, window_days)))
        .filter_map(|c| c.author_id)
        .collect();

    ContributorCounts {
        observed: observed.len(),
        reported: repo.contributor_count,
        effective: repo
            .contributor_count
            .unwrap_or(0)
            .max(observed.len() as u64),
        active_in_window: active.len(),
    }
}

/// Percentage per language, from byte counts or the primary language alone.
#[allow(clippy::cast_precision_loss)]
fn language_breakdown(repo: &Repository) -> IndexMap<String, f64> {
    let total: u64 = repo.languages.values().sum();
    if total > 0 {
        return repo
            .languages
            .iter()
            .map(|(language, bytes)| (language.clone(), *bytes as f64 / total as f64 * 100.0))
            .collect();
    }
    repo.language
        .iter()
        .map(|language| (language.clone(), 100.0))
        .collect()
}

fn tier(value: f64, thresholds: [f64; 3]) -> f64 {
    if value > thresholds[0] {
        15.0
    } else if value > thresholds[1] {
        10.0
    } else if value > thresholds[2] {
        5.0
    } else {
        0.0
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn health_score(
    commits_per_day: f64,
    stars_per_day: f64,
    contributors: u64,
    languages: usize,
) -> f64 {
    let mut score = BASE_HEALTH;
    score += tier(commits_per_day, [3.0, 1.0, 0.5]);
    score += tier(stars_per_day, [5.0, 1.0, 0.1]);
    score += tier(contributors as f64, [20.0, 10.0, 5.0]);
    score += match languages {
        n if n > 5 => 5.0,
        n if n > 3 => 3.0,
        _ => 0.0,
    };
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::stages::fixtures;
    use chrono::Duration;

    fn settings() -> PipelineSettings {
        PipelineSettings::default()
    }

    #[test]
    fn quiet_repository_scores_base_health() {
        let repo = fixtures::repository(1, 0);
        let record = repository_statistics(&repo, &[], &settings(), fixtures::as_of());
        assert_eq!(record.health_score, 50.0);
        assert_eq!(record.commit_frequency.commits_in_window, 0);
        assert_eq!(record.language_breakdown.get("Rust"), Some(&100.0));
        assert_eq!(record.fork_statistics.activity_tier, "none");
    }

    #[test]
    fn busy_popular_repository_reaches_the_ceiling() {
        let as_of = fixtures::as_of();
        let mut repo = fixtures::repository(1, 5000);
        repo.contributor_count = Some(25);
        repo.star_events = (0..200).map(|i| as_of - Duration::hours(i)).collect();
        for (i, language) in ["Rust", "C", "Go", "Shell", "Python", "Lua"].iter().enumerate() {
            repo.languages.insert((*language).to_string(), 100 * (i as u64 + 1));
        }
        let commits: Vec<Commit> = (0..120i64)
            .map(|i| {
                let mut c = fixtures::commit(&format!("c{i}"), 1, (i % 30) as u64, 1, 1);
                c.authored_at = Some(as_of - Duration::hours(i * 5));
                c
            })
            .collect();
        let refs: Vec<&Commit> = commits.iter().collect();

        let record = repository_statistics(&repo, &refs, &settings(), as_of);

        assert_eq!(record.health_score, 100.0);
        assert_eq!(record.commit_frequency.commits_in_window, 120);
        assert_eq!(record.contributor_counts.effective, 30);
        assert!(record.star_history.observed);
        assert_eq!(record.star_history.new_stars, 200.0);
    }

    #[test]
    fn health_score_tiers() {
        assert_eq!(health_score(0.6, 0.0, 0, 0), 55.0);
        assert_eq!(health_score(2.0, 2.0, 11, 4), 83.0);
        assert_eq!(health_score(10.0, 10.0, 100, 10), 100.0);
    }

    #[test]
    fn star_history_falls_back_to_lifetime_average() {
        let as_of = fixtures::as_of();
        let mut repo = fixtures::repository(1, 1000);
        repo.created_at = Some(as_of - Duration::days(100));

        let history = star_history(&repo, 30, as_of);

        assert!(!history.observed);
        assert_eq!(history.daily_average, 10.0);
        assert_eq!(history.new_stars, 300.0);
    }

    #[test]
    fn commits_outside_window_are_ignored() {
        let as_of = fixtures::as_of();
        let mut old = fixtures::commit("old", 1, 1, 1, 0);
        old.authored_at = Some(as_of - Duration::days(45));
        let recent = fixtures::commit("new", 1, 2, 1, 0);

        let frequency = commit_frequency(&[&old, &recent], 30, as_of);

        assert_eq!(frequency.commits_in_window, 1);
        // 2024-05-31 is a Friday.
        assert_eq!(frequency.by_weekday[4], 1);
    }

    #[test]
    fn fork_tiers_and_ratio() {
        let mut repo = fixtures::repository(1, 200);
        repo.forks = 150;
        let forks = fork_statistics(&repo);
        assert_eq!(forks.activity_tier, "high");
        assert_eq!(forks.forks_per_star, 0.75);
    }

    #[test]
    fn language_breakdown_uses_byte_counts() {
        let mut repo = fixtures::repository(1, 0);
        repo.languages.insert("Rust".into(), 750);
        repo.languages.insert("Shell".into(), 250);
        let breakdown = language_breakdown(&repo);
        assert_eq!(breakdown.get("Rust"), Some(&75.0));
        assert_eq!(breakdown.get("Shell"), Some(&25.0));
    }
}

//! The eight component formulas of the contributor score.
//!
//! Every function returns a value in `[0, 100]`.

use crate::models::Contributor;

/// Repositories with at least this many stars count as popular.
pub const POPULAR_REPO_STARS: u64 = 1000;

/// Star total at which the logarithmic part of popularity saturates.
const POPULARITY_LOG_CEILING: f64 = 25_000.0;

/// `value / max * 100`, or 0 when nobody in the run has any.
#[allow(clippy::cast_precision_loss)]
pub fn relative_score(value: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (value as f64 / max as f64 * 100.0).clamp(0.0, 100.0)
}

/// How closely a merge request's diff matches the commits behind it.
#[allow(clippy::cast_precision_loss)]
pub fn merge_request_efficiency(pr_changes: u64, commit_changes: u64) -> f64 {
    if commit_changes == 0 {
        return 0.0;
    }
    if pr_changes == commit_changes {
        return 100.0;
    }
    let drift = pr_changes.abs_diff(commit_changes) as f64 / commit_changes as f64;
    ((1.0 - drift) * 100.0).max(0.0)
}

/// Average efficiency over `(pr_changes, commit_changes)` pairs; 0 without any.
#[allow(clippy::cast_precision_loss)]
pub fn code_efficiency(pairs: &[(u64, u64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let total: f64 = pairs
        .iter()
        .map(|&(pr, commits)| merge_request_efficiency(pr, commits))
        .sum();
    total / pairs.len() as f64
}

/// Saturating reward for working in larger groups; a solo contributor gets 0.
#[allow(clippy::cast_precision_loss)]
pub fn team_collaboration(collaborator_count: usize) -> f64 {
    if collaborator_count <= 1 {
        return 0.0;
    }
    100.0 * (1.0 - 1.0 / (collaborator_count as f64).powf(0.8))
}

#[allow(clippy::cast_precision_loss)]
pub fn repository_popularity(total_stars: u64, popular_repo_count: usize) -> f64 {
    let log_part = ((total_stars as f64) + 1.0).ln() / POPULARITY_LOG_CEILING.ln() * 60.0;
    let popular_part = popular_repo_count.min(5) as f64 * 8.0;
    (log_part + popular_part).clamp(0.0, 100.0)
}

pub fn profile_completeness(contributor: &Contributor) -> f64 {
    let filled = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

    let mut points = 0.0;
    if !contributor.login.trim().is_empty() {
        points += 10.0;
    }
    for (field, weight) in [
        (&contributor.name, 10.0),
        (&contributor.avatar_url, 10.0),
        (&contributor.bio, 15.0),
        (&contributor.company, 10.0),
        (&contributor.location, 10.0),
        (&contributor.blog, 10.0),
        (&contributor.twitter_username, 10.0),
    ] {
        if filled(field) {
            points += weight;
        }
    }
    if !contributor.top_languages.is_empty() {
        points += 15.0;
    }
    f64::min(points, 100.0)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn contributor(login: &str) -> Contributor {
        Contributor {
            id: 1,
            login: login.to_string(),
            name: None,
            avatar_url: None,
            bio: None,
            company: None,
            location: None,
            blog: None,
            twitter_username: None,
            followers: 0,
            following: 0,
            public_repos: 0,
            top_languages: vec![],
            created_at: None,
        }
    }

    #[cfg(test)]
    mod team_collaboration {
        use super::*;

        #[test]
        fn solo_contributor_scores_zero() {
            assert_eq!(team_collaboration(1), 0.0);
            assert_eq!(team_collaboration(0), 0.0);
        }

        #[test]
        fn pair_scores_about_forty_three() {
            let score = team_collaboration(2);
            assert!((score - 42.565).abs() < 0.01, "got {score}");
            assert_eq!(score.round(), 43.0);
        }

        #[test]
        fn increases_monotonically_and_stays_below_hundred() {
            let mut previous = team_collaboration(1);
            for n in 2..500 {
                let score = team_collaboration(n);
                assert!(score > previous, "not increasing at {n}");
                assert!(score < 100.0);
                previous = score;
            }
            assert!(team_collaboration(1_000_000) < 100.0);
        }
    }

    #[cfg(test)]
    mod code_efficiency {
        use super::*;

        #[test]
        fn exact_match_scores_hundred() {
            assert_eq!(code_efficiency(&[(120, 120), (7, 7)]), 100.0);
        }

        #[test]
        fn zero_commit_changes_scores_zero() {
            assert_eq!(code_efficiency(&[(50, 0), (0, 0)]), 0.0);
        }

        #[test]
        fn no_merge_requests_scores_zero() {
            assert_eq!(code_efficiency(&[]), 0.0);
        }

        #[test]
        fn drift_reduces_score_linearly() {
            assert_eq!(merge_request_efficiency(75, 100), 75.0);
            assert_eq!(merge_request_efficiency(125, 100), 75.0);
        }

        #[test]
        fn drift_beyond_commit_size_floors_at_zero() {
            assert_eq!(merge_request_efficiency(350, 100), 0.0);
        }

        #[test]
        fn averages_across_merge_requests() {
            assert_eq!(code_efficiency(&[(100, 100), (50, 100)]), 75.0);
        }
    }

    #[cfg(test)]
    mod repository_popularity {
        use super::*;

        #[test]
        fn no_stars_scores_zero() {
            assert_eq!(repository_popularity(0, 0), 0.0);
        }

        #[test]
        fn monotonic_in_total_stars() {
            let mut previous = 0.0;
            for stars in [0, 1, 10, 100, 1_000, 10_000, 25_000, 1_000_000] {
                let score = repository_popularity(stars, 0);
                assert!(score >= previous);
                previous = score;
            }
        }

        #[test]
        fn monotonic_in_popular_count() {
            let mut previous = 0.0;
            for count in 0..10 {
                let score = repository_popularity(5_000, count);
                assert!(score >= previous);
                previous = score;
            }
        }

        #[test]
        fn never_exceeds_hundred() {
            assert_eq!(repository_popularity(u64::MAX / 2, 50), 100.0);
            assert!(repository_popularity(24_999, 5) <= 100.0);
        }

        #[test]
        fn log_part_reaches_sixty_at_ceiling() {
            let score = repository_popularity(24_999, 0);
            assert!((score - 60.0).abs() < 1e-9, "got {score}");
        }
    }

    #[test]
    fn relative_score_handles_zero_max() {
        assert_eq!(relative_score(0, 0), 0.0);
        assert_eq!(relative_score(5, 10), 50.0);
        assert_eq!(relative_score(10, 10), 100.0);
    }

    #[test]
    fn profile_with_only_username_scores_ten() {
        assert_eq!(profile_completeness(&contributor("octo")), 10.0);
    }

    #[test]
    fn full_profile_caps_at_hundred() {
        let mut c = contributor("octo");
        c.name = Some("Octo Cat".into());
        c.avatar_url = Some("https://avatars/1".into());
        c.bio = Some("Builds things".into());
        c.company = Some("Acme".into());
        c.location = Some("Earth".into());
        c.blog = Some("https://octo.dev".into());
        c.twitter_username = Some("octo".into());
        c.top_languages = vec!["Rust".into()];
        assert_eq!(profile_completeness(&c), 100.0);
    }

    #[test]
    fn blank_fields_do_not_count() {
        let mut c = contributor("octo");
        c.bio = Some("   ".into());
        c.company = Some("Acme".into());
        assert_eq!(profile_completeness(&c), 20.0);
    }
}

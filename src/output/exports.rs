use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::models::ContributorRankingRecord;

/// Serializes any run result as JSON.
pub fn export_json<T: Serialize>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

/// Writes the leaderboard as CSV, one row per contributor.
pub fn export_rankings_csv(
    rankings: &[ContributorRankingRecord],
    output: &mut dyn Write,
) -> Result<()> {
    writeln!(
        output,
        "Rank,Contributor ID,Login,Total Score,Code Volume,Code Efficiency,Commit Impact,Team Collaboration,Repository Popularity,Repository Influence,Followers,Profile Completeness,Commits,Lines Added,Lines Removed,Repositories,Follower Count,Calculated At"
    )?;

    for record in rankings {
        let c = &record.components;
        let raw = &record.raw_metrics;
        writeln!(
            output,
            "{},{},\"{}\",{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{},{},{},{}",
            record.rank_position,
            record.contributor_id,
            record.login.replace('"', "\"\""),
            record.total_score,
            c.code_volume,
            c.code_efficiency,
            c.commit_impact,
            c.team_collaboration,
            c.repository_popularity,
            c.repository_influence,
            c.followers,
            c.profile_completeness,
            raw.commits,
            raw.lines_added,
            raw.lines_removed,
            raw.repositories_contributed,
            raw.followers,
            record.calculation_timestamp.to_rfc3339()
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RankingComponents, RawMetrics};
    use chrono::{TimeZone, Utc};

    fn record() -> ContributorRankingRecord {
        ContributorRankingRecord {
            contributor_id: 7,
            login: "octo".into(),
            rank_position: 1,
            total_score: 72.346,
            components: RankingComponents {
                code_efficiency: 100.0,
                ..RankingComponents::default()
            },
            raw_metrics: RawMetrics {
                commits: 3,
                lines_added: 30,
                lines_removed: 4,
                repositories_contributed: 1,
                followers: 9,
            },
            calculation_timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let mut buffer = Vec::new();
        export_rankings_csv(&[record()], &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Rank,Contributor ID,Login"));
        assert_eq!(
            lines[1],
            "1,7,\"octo\",72.35,0.00,100.00,0.00,0.00,0.00,0.00,0.00,0.00,3,30,4,1,9,2024-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn json_export_is_one_document() {
        let mut buffer = Vec::new();
        export_json(&vec![record()], true, &mut buffer).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed[0]["login"], "octo");
        assert_eq!(parsed[0]["rank_position"], 1);
        assert_eq!(parsed[0]["raw_metrics"]["commits"], 3);
    }
}

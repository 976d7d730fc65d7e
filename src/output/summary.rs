use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};
use indexmap::IndexMap;

use crate::models::{ContributorRankingRecord, RepositoryStatisticsRecord};
use crate::pipeline::{PipelineDefinition, RunStats, StageError};

use super::styling::{bright, bright_yellow, cyan, dim, outcome_label};
use super::tables::{color_coded_score_cell, create_table, cyan_header, rank_cell};

/// Errors listed before the table is cut off.
const MAX_ERRORS_SHOWN: usize = 10;

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

/// Prints the outcome of one pipeline invocation to stdout.
pub fn print_run_summary(pipeline: &str, stats: &RunStats, errors: &[StageError]) {
    println!("{}", render_run_summary(pipeline, stats, errors));
}

pub fn print_leaderboard(rankings: &[ContributorRankingRecord]) {
    println!("{}", render_leaderboard(rankings));
}

pub fn print_repository_health(statistics: &IndexMap<u64, RepositoryStatisticsRecord>) {
    if !statistics.is_empty() {
        println!("{}", render_repository_health(statistics));
    }
}

pub fn print_pipelines(definitions: &[&PipelineDefinition]) {
    println!("{}", render_pipelines(definitions));
}

fn render_run_summary(pipeline: &str, stats: &RunStats, errors: &[StageError]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📊", "Overview");

    let rows = [
        ("Pipeline:", cyan(pipeline).to_string()),
        ("Outcome:", outcome_label(errors.len()).to_string()),
        ("Stages completed:", bright_yellow(stats.stages_completed).to_string()),
        ("Payloads processed:", bright_yellow(stats.payloads_processed).to_string()),
        (
            "Entities extracted:",
            bright_yellow(
                stats.repositories_extracted
                    + stats.contributors_extracted
                    + stats.merge_requests_extracted
                    + stats.commits_extracted,
            )
            .to_string(),
        ),
        ("Entities enriched:", bright_yellow(stats.entities_enriched).to_string()),
        (
            "Records analyzed:",
            bright_yellow(
                stats.repositories_analyzed
                    + stats.commits_analyzed
                    + stats.merge_requests_analyzed
                    + stats.contributors_analyzed,
            )
            .to_string(),
        ),
        ("Contributors ranked:", bright_yellow(stats.contributors_ranked).to_string()),
        ("Efficiency updates:", bright_yellow(stats.efficiency_updates).to_string()),
        ("Records persisted:", bright_yellow(stats.records_persisted).to_string()),
    ];
    for (label, value) in rows {
        let _ = writeln!(output, "  {} {value}", dim(label));
    }

    if !errors.is_empty() {
        output.push('\n');
        add_section_header(&mut output, "⚠️", "Errors");

        let mut table = create_table();
        table.set_header(cyan_header(&["Stage", "Item", "Message"]));
        for error in errors.iter().take(MAX_ERRORS_SHOWN) {
            let message = match &error.cause {
                Some(cause) => format!("{}\n{cause}", error.message),
                None => error.message.clone(),
            };
            table.add_row(vec![
                Cell::new(&error.stage),
                Cell::new(error.item_id.as_deref().unwrap_or("-")),
                Cell::new(message).fg(TableColor::Red),
            ]);
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            table.add_row(vec![
                Cell::new(format!("... and {} more", errors.len() - MAX_ERRORS_SHOWN))
                    .fg(TableColor::DarkGrey),
                Cell::new(""),
                Cell::new(""),
            ]);
        }
        let _ = write!(output, "{table}");
    }

    output
}

fn render_leaderboard(rankings: &[ContributorRankingRecord]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🏆", "Leaderboard");

    if rankings.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No rankings available."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "#",
        "Contributor",
        "Score",
        "Efficiency",
        "Collaboration",
        "Popularity",
        "Commits",
        "Lines +/-",
        "Repos",
    ]));

    for record in rankings {
        let c = &record.components;
        let raw = &record.raw_metrics;
        table.add_row(vec![
            rank_cell(record.rank_position),
            Cell::new(&record.login),
            color_coded_score_cell(record.total_score),
            color_coded_score_cell(c.code_efficiency),
            color_coded_score_cell(c.team_collaboration),
            color_coded_score_cell(c.repository_popularity),
            Cell::new(raw.commits),
            Cell::new(format!("+{} / -{}", raw.lines_added, raw.lines_removed)),
            Cell::new(raw.repositories_contributed),
        ]);
    }

    let _ = writeln!(output, "{table}");
    if let Some(first) = rankings.first() {
        let _ = write!(
            output,
            "  {} {}",
            dim("Calculated at:"),
            dim(first.calculation_timestamp.format("%Y-%m-%d %H:%M UTC"))
        );
    }
    output
}

fn render_repository_health(statistics: &IndexMap<u64, RepositoryStatisticsRecord>) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🩺", "Repository Health");

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Repository",
        "Health",
        "Commits/day",
        "Stars/day",
        "Contributors",
        "Forks",
    ]));
    for record in statistics.values() {
        table.add_row(vec![
            Cell::new(record.repository_id),
            color_coded_score_cell(record.health_score),
            Cell::new(format!("{:.2}", record.commit_frequency.daily_average)),
            Cell::new(format!("{:.2}", record.star_history.daily_average)),
            Cell::new(record.contributor_counts.effective),
            Cell::new(format!(
                "{} ({})",
                record.fork_statistics.total_forks, record.fork_statistics.activity_tier
            )),
        ]);
    }
    let _ = write!(output, "{table}");
    output
}

fn render_pipelines(definitions: &[&PipelineDefinition]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🧩", "Pipelines");

    let mut table = create_table();
    table.set_header(cyan_header(&["Name", "Stages", "Concurrency", "Retries"]));
    for definition in definitions {
        table.add_row(vec![
            Cell::new(&definition.name).fg(TableColor::Cyan),
            Cell::new(definition.stages.join(" → ")),
            Cell::new(definition.concurrency),
            Cell::new(definition.retries),
        ]);
    }
    let _ = write!(output, "{table}");
    output
}

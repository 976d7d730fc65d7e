use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use contriblens::auth::Token;
use contriblens::config::{Config, OutputFormat};
use contriblens::models::{
    Commit, Contributor, ContributorRankingRecord, MergeRequest, Repository,
    RepositoryStatisticsRecord,
};
use contriblens::output::{self, RunProgress};
use contriblens::pipeline::{
    process_commits, process_contributors, process_merge_requests, process_payloads,
    process_repositories, run_with_retries, BatchOptions, BatchOutcome, PipelineContext, Registry,
    COMMIT_PIPELINE, CONTRIBUTOR_PIPELINE, EFFICIENCY_PIPELINE, INGEST_PIPELINE,
    MERGE_REQUEST_PIPELINE, RANKING_PIPELINE, REPOSITORY_PIPELINE,
};
use contriblens::source::{GitHubClient, SourceClient};
use contriblens::store::{load_rankings, SqliteStore, Store};

#[derive(Parser)]
#[command(name = "contriblens")]
#[command(author, version, about = "Contributor analytics for version-control metadata", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; defaults to ./contriblens.{toml,json,yaml,yml}
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Skip upstream enrichment
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over a JSON input file
    Run {
        #[arg(short = 'P', long, default_value = INGEST_PIPELINE)]
        pipeline: String,

        /// Payload array for `ingest`, entity array for entity pipelines
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Recompute the leaderboard from persisted data
    Rank,
    /// Recompute contributor code efficiency in the store
    Efficiency,
    /// Show the persisted leaderboard
    Leaderboard {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List registered pipelines
    Pipelines,
    /// Write a default config file
    Init {
        #[arg(default_value = "contriblens.toml")]
        path: PathBuf,
    },
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(db) = &self.db {
            config.store.path = Some(db.clone());
        }
        if let Some(token) = &self.token {
            config.source.token = Some(token.clone());
        }
        if self.offline {
            config.source.offline = true;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.pretty {
            config.output.pretty = true;
        }

        Ok(config)
    }

    fn open_store(config: &Config) -> Result<SqliteStore> {
        let path = config.database_path()?;
        SqliteStore::open(&path)
            .with_context(|| format!("Failed to open store: {}", path.display()))
    }

    fn build_registry(config: &Config) -> Result<Registry> {
        let store: Arc<dyn Store> = Arc::new(Self::open_store(config)?);

        let source: Option<Arc<dyn SourceClient>> = if config.source.offline {
            info!("Offline mode, enrichment disabled");
            None
        } else {
            let token = config.source.token.as_deref().map(Token::from);
            let client = GitHubClient::new(
                &config.source.base_url,
                token,
                config.source.max_retries,
                Duration::from_secs(config.source.retry_delay_seconds),
            )?;
            Some(Arc::new(client))
        };

        Ok(Registry::with_defaults(
            config.pipeline_settings(),
            Some(store),
            source,
        ))
    }

    fn open_output(&self) -> Result<Box<dyn Write>> {
        match &self.output {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?;
                info!("Writing output to: {}", path.display());
                Ok(Box::new(file))
            }
            None => Ok(Box::new(std::io::stdout())),
        }
    }

    /// Writes a pipeline outcome in the configured format.
    fn report<S: Serialize>(
        &self,
        config: &Config,
        pipeline: &str,
        outcome: &BatchOutcome<S>,
        rankings: Option<&[ContributorRankingRecord]>,
        health: Option<&IndexMap<u64, RepositoryStatisticsRecord>>,
    ) -> Result<()> {
        match config.output.format {
            OutputFormat::Summary => {
                output::print_run_summary(pipeline, &outcome.stats, &outcome.errors);
                if let Some(health) = health {
                    output::print_repository_health(health);
                }
                if let Some(rankings) = rankings {
                    let shown = rankings.len().min(config.output.leaderboard_limit);
                    output::print_leaderboard(&rankings[..shown]);
                }
            }
            OutputFormat::Json => {
                output::export_json(outcome, config.output.pretty, &mut *self.open_output()?)?;
            }
            OutputFormat::Csv => match rankings {
                Some(rankings) => output::export_rankings_csv(rankings, &mut *self.open_output()?)?,
                None => bail!("CSV output is only available for pipelines that rank contributors"),
            },
        }
        Ok(())
    }

    async fn execute_run(&self, config: &Config, pipeline: &str, input: &Path) -> Result<()> {
        info!("Running pipeline '{pipeline}' over: {}", input.display());

        let contents = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        let raw: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("Input is not valid JSON: {}", input.display()))?;

        let registry = Self::build_registry(config)?;
        registry.definition(pipeline)?;

        let options = BatchOptions {
            pipeline: Some(pipeline.to_string()),
            as_of: None,
        };

        match pipeline {
            REPOSITORY_PIPELINE => {
                let repositories: Vec<Repository> =
                    serde_json::from_value(raw).context("Input is not a repository array")?;
                let progress = RunProgress::start(pipeline);
                let outcome =
                    settle(progress, process_repositories(&registry, repositories, &options).await)?;
                self.report(config, pipeline, &outcome, None, Some(&outcome.statistics))
            }
            CONTRIBUTOR_PIPELINE => {
                let contributors: Vec<Contributor> =
                    serde_json::from_value(raw).context("Input is not a contributor array")?;
                let progress = RunProgress::start(pipeline);
                let outcome =
                    settle(progress, process_contributors(&registry, contributors, &options).await)?;
                self.report(config, pipeline, &outcome, None, None)
            }
            COMMIT_PIPELINE => {
                let commits: Vec<Commit> =
                    serde_json::from_value(raw).context("Input is not a commit array")?;
                let progress = RunProgress::start(pipeline);
                let outcome = settle(progress, process_commits(&registry, commits, &options).await)?;
                self.report(config, pipeline, &outcome, None, None)
            }
            MERGE_REQUEST_PIPELINE => {
                let merge_requests: Vec<MergeRequest> =
                    serde_json::from_value(raw).context("Input is not a merge request array")?;
                let progress = RunProgress::start(pipeline);
                let outcome = settle(
                    progress,
                    process_merge_requests(&registry, merge_requests, &options).await,
                )?;
                self.report(config, pipeline, &outcome, None, None)
            }
            _ => {
                let progress = RunProgress::start(pipeline);
                let outcome = settle(progress, process_payloads(&registry, raw, &options).await)?;
                let statistics = &outcome.statistics;
                self.report(
                    config,
                    pipeline,
                    &outcome,
                    Some(statistics.rankings.as_slice()),
                    Some(&statistics.repositories),
                )
            }
        }
    }

    async fn execute_rank(&self, config: &Config) -> Result<()> {
        let registry = Self::build_registry(config)?;
        let progress = RunProgress::start(RANKING_PIPELINE);
        let as_of = Utc::now();
        let result = run_with_retries(&registry, RANKING_PIPELINE, || PipelineContext::new(as_of))
            .await
            .map(|ctx| BatchOutcome {
                statistics: ctx.rankings.unwrap_or_default(),
                errors: ctx.errors,
                stats: ctx.stats,
            });
        let outcome = settle(progress, result)?;
        self.report(
            config,
            RANKING_PIPELINE,
            &outcome,
            Some(outcome.statistics.as_slice()),
            None,
        )
    }

    async fn execute_efficiency(&self, config: &Config) -> Result<()> {
        let registry = Self::build_registry(config)?;
        let progress = RunProgress::start(EFFICIENCY_PIPELINE);
        let as_of = Utc::now();
        let result =
            run_with_retries(&registry, EFFICIENCY_PIPELINE, || PipelineContext::new(as_of))
                .await
                .map(|ctx| BatchOutcome {
                    statistics: ctx.stats.efficiency_updates,
                    errors: ctx.errors,
                    stats: ctx.stats,
                });
        let outcome = settle(progress, result)?;
        self.report(config, EFFICIENCY_PIPELINE, &outcome, None, None)
    }

    fn execute_leaderboard(&self, config: &Config, limit: Option<usize>) -> Result<()> {
        let store = Self::open_store(config)?;
        let limit = limit.unwrap_or(config.output.leaderboard_limit);
        let rankings = load_rankings(&store, limit).context("Failed to load rankings")?;
        info!("Loaded {} rankings", rankings.len());

        match config.output.format {
            OutputFormat::Summary => output::print_leaderboard(&rankings),
            OutputFormat::Json => {
                output::export_json(&rankings, config.output.pretty, &mut *self.open_output()?)?;
            }
            OutputFormat::Csv => output::export_rankings_csv(&rankings, &mut *self.open_output()?)?,
        }
        Ok(())
    }

    fn execute_pipelines(&self, config: &Config) -> Result<()> {
        let registry = Registry::with_defaults(config.pipeline_settings(), None, None);
        let definitions = registry.pipelines();

        match config.output.format {
            OutputFormat::Summary => output::print_pipelines(&definitions),
            OutputFormat::Json => {
                output::export_json(&definitions, config.output.pretty, &mut *self.open_output()?)?;
            }
            OutputFormat::Csv => bail!("CSV output is not available for pipeline definitions"),
        }
        Ok(())
    }

    fn execute_init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        Config::default().save(path)?;
        eprintln!("{} {}", output::dim("Wrote"), path.display());
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        if let Commands::Init { path } = &self.command {
            return Self::execute_init(path);
        }

        let config = self.resolve_config()?;
        match &self.command {
            Commands::Run { pipeline, input } => self.execute_run(&config, pipeline, input).await,
            Commands::Rank => self.execute_rank(&config).await,
            Commands::Efficiency => self.execute_efficiency(&config).await,
            Commands::Leaderboard { limit } => self.execute_leaderboard(&config, *limit),
            Commands::Pipelines => self.execute_pipelines(&config),
            Commands::Init { .. } => Ok(()),
        }
    }
}

/// Closes the spinner according to how the run ended.
fn settle<S>(
    progress: RunProgress,
    result: contriblens::error::Result<BatchOutcome<S>>,
) -> Result<BatchOutcome<S>> {
    match result {
        Ok(outcome) => {
            progress.finish(outcome.stats.stages_completed);
            Ok(outcome)
        }
        Err(e) => {
            progress.fail();
            Err(e).context("Pipeline run failed")
        }
    }
}

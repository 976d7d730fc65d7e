use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineSettings;
use crate::scoring::ScoringWeights;

/// Configuration file structure for contriblens.
///
/// Loaded from the current directory or a specified path; command-line flags
/// override what the file says.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Upstream source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Database settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Stage tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Contributor scoring
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// GitHub API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    /// Retries for rate-limited or failing requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries, in seconds
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Skip enrichment entirely
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// SQLite database path; defaults to the user data directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    #[serde(default = "default_window_days")]
    pub commit_window_days: u32,

    #[serde(default = "default_window_days")]
    pub star_window_days: u32,

    /// Concurrent upstream requests per stage
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Escalate the first per-item failure of any stage
    #[serde(default)]
    pub abort_on_error: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Rows shown by `leaderboard`
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_github_base_url(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            offline: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_window_days: default_window_days(),
            star_window_days: default_window_days(),
            fan_out: default_fan_out(),
            abort_on_error: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Summary,
            pretty: false,
            leaderboard_limit: default_leaderboard_limit(),
        }
    }
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    2
}

fn default_window_days() -> u32 {
    30
}

fn default_fan_out() -> usize {
    4
}

fn default_leaderboard_limit() -> usize {
    20
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./contriblens.toml
    /// 3. ./contriblens.json
    /// 4. ./contriblens.yaml
    /// 5. ./contriblens.yml
    ///
    /// Returns default configuration if no file is found. Scoring weights are
    /// validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => Self::load_from_path(path)?,
            Some(_) => Self::default(),
            None => {
                let candidates = [
                    "contriblens.toml",
                    "contriblens.json",
                    "contriblens.yaml",
                    "contriblens.yml",
                ];
                match candidates.iter().map(Path::new).find(|p| p.exists()) {
                    Some(path) => Self::load_from_path(path)?,
                    None => Self::default(),
                }
            }
        };

        config
            .scoring
            .weights
            .validate()
            .context("Invalid [scoring.weights]")?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            commit_window_days: self.pipeline.commit_window_days,
            star_window_days: self.pipeline.star_window_days,
            fan_out: self.pipeline.fan_out.max(1),
            abort_on_error: self.pipeline.abort_on_error,
            weights: self.scoring.weights.clone(),
        }
    }

    /// Configured database path, or `<data dir>/contriblens/contriblens.db`.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().context("Could not determine the user data directory")?;
        Ok(data_dir.join("contriblens").join("contriblens.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.base_url, "https://api.github.com");
        assert_eq!(config.source.max_retries, 3);
        assert_eq!(config.pipeline.commit_window_days, 30);
        assert_eq!(config.pipeline.fan_out, 4);
        assert_eq!(config.output.leaderboard_limit, 20);
        assert_eq!(config.pipeline_settings(), PipelineSettings::default());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[source]
token = "ghp-test-token"
base-url = "https://github.example.com/api/v3"
offline = true

[pipeline]
star-window-days = 7
abort-on-error = true

[output]
format = "json"
leaderboard-limit = 5
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.source.token, Some("ghp-test-token".to_string()));
        assert_eq!(config.source.base_url, "https://github.example.com/api/v3");
        assert!(config.source.offline);
        assert_eq!(config.pipeline.star_window_days, 7);
        assert_eq!(config.pipeline.commit_window_days, 30);
        assert!(config.pipeline_settings().abort_on_error);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.leaderboard_limit, 5);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "store": {"path": "/tmp/leaderboard.db"},
  "output": {"format": "csv"}
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/leaderboard.db")
        );
        assert_eq!(config.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_load_yaml_weights() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r"
scoring:
  weights:
    code-volume: 0.10
    code-efficiency: 0.10
    commit-impact: 0.10
    team-collaboration: 0.20
    repository-popularity: 0.20
    repository-influence: 0.10
    followers: 0.15
    profile-completeness: 0.05
";
        write!(temp_file, "{yaml_content}").unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert!((config.scoring.weights.code_volume - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weights_not_summing_to_one_are_rejected() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            temp_file,
            "[scoring.weights]\nfollowers = 0.9\n"
        )
        .unwrap();

        let err = Config::load(Some(temp_file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("sum to 1"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load(Some(Path::new("nonexistent.toml"))).unwrap();
        assert_eq!(config.source.base_url, "https://api.github.com");
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("contriblens.yaml");
        let mut config = Config::default();
        config.pipeline.fan_out = 9;
        config.output.pretty = true;

        config.save(&path).unwrap();
        let reloaded = Config::load(Some(&path)).unwrap();

        assert_eq!(reloaded.pipeline.fan_out, 9);
        assert!(reloaded.output.pretty);
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContribLensError {
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Unknown stage '{stage}' referenced by pipeline '{pipeline}'")]
    UnknownStage { pipeline: String, stage: String },

    #[error("Stage '{stage}' requires context field '{field}' to be populated")]
    MissingContext { stage: String, field: String },

    #[error("Stage '{stage}' failed on item {item_id}: {message}")]
    ItemFailed {
        stage: String,
        item_id: String,
        message: String,
    },

    #[error("API request failed: {0}")]
    Api(String),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContribLensError {
    /// Structural errors abort a run regardless of the failing stage's policy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnknownPipeline(_) | Self::UnknownStage { .. } | Self::MissingContext { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ContribLensError>;

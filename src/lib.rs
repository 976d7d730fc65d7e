//! Ingests version-control metadata through configurable stage pipelines,
//! derives repository, commit, merge request and contributor statistics, and
//! ranks contributors with a weighted multi-metric score.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod scoring;
pub mod source;
pub mod stages;
pub mod store;

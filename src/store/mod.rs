//! Relational store boundary.
//!
//! Stages talk to persistence only through [`Store`]: raw SQL with JSON
//! parameters in, rows of JSON values out. Every logical update that touches
//! more than one row goes through [`Store::transaction`] so readers never see
//! a half-written snapshot.

mod schema;
mod sqlite;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ContribLensError, Result};
use crate::models::ContributorRankingRecord;

pub use sqlite::SqliteStore;

/// One result row, columns in select order.
pub type Row = IndexMap<String, Value>;

/// A parameterized statement executed as part of a transaction.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

pub trait Store: Send + Sync {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs a single statement and returns the number of changed rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Runs all statements inside one transaction. Any failure rolls back the
    /// whole batch.
    fn transaction(&self, statements: &[Statement]) -> Result<usize>;
}

/// Decodes the JSON `payload` column of each row.
pub fn decode_payloads<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            let payload = row
                .get("payload")
                .and_then(Value::as_str)
                .ok_or_else(|| ContribLensError::Store("row has no payload column".into()))?;
            Ok(serde_json::from_str(payload)?)
        })
        .collect()
}

/// Reads the current ranking snapshot, best first.
pub fn load_rankings(store: &dyn Store, limit: usize) -> Result<Vec<ContributorRankingRecord>> {
    let rows = store.query(
        "SELECT payload FROM contributor_rankings ORDER BY rank_position LIMIT ?1",
        &[Value::from(limit as u64)],
    )?;
    decode_payloads(rows)
}

use log::info;
use serde::de::DeserializeOwned;

use crate::error::{ContribLensError, Result};
use crate::pipeline::{ContextField, PipelineContext, StageConfig, StageEnv};
use crate::store::{decode_payloads, Store};

/// Fills empty entity collections from the store.
#[derive(Debug, Clone)]
pub struct StoreLoadStage {
    pub config: StageConfig,
}

impl StoreLoadStage {
    pub const NAME: &'static str = "store-load";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let store = env.store.as_deref().ok_or_else(|| {
            ContribLensError::Config(format!("stage '{}' needs a store", Self::NAME))
        })?;

        let before = ctx.stats.entities_loaded;
        if ctx.repositories.is_empty() {
            ctx.repositories = load(store, "repositories")?;
            ctx.stats.entities_loaded += ctx.repositories.len();
        }
        if ctx.contributors.is_empty() {
            ctx.contributors = load(store, "contributors")?;
            ctx.stats.entities_loaded += ctx.contributors.len();
        }
        if ctx.merge_requests.is_empty() {
            ctx.merge_requests = load(store, "merge_requests")?;
            ctx.stats.entities_loaded += ctx.merge_requests.len();
        }
        if ctx.commits.is_empty() {
            ctx.commits = load(store, "commits")?;
            ctx.stats.entities_loaded += ctx.commits.len();
        }

        info!(
            "Loaded {} entities from the store",
            ctx.stats.entities_loaded - before
        );
        Ok(())
    }
}

/// Integer-keyed tables come back in id order, `commits` in insertion order.
fn load<T: DeserializeOwned>(store: &dyn Store, table: &str) -> Result<Vec<T>> {
    let rows = store.query(&format!("SELECT payload FROM {table} ORDER BY rowid"), &[])?;
    decode_payloads(rows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::stages::{fixtures, PersistenceStage};
    use crate::store::SqliteStore;

    #[test]
    fn loads_what_persistence_wrote() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let env = StageEnv {
            store: Some(store),
            ..StageEnv::default()
        };

        let mut written = PipelineContext::default()
            .with_repositories(vec![fixtures::repository(1, 3), fixtures::repository(2, 10)])
            .with_contributors(vec![fixtures::contributor(7, "octo")])
            .with_commits(vec![fixtures::commit("c1", 2, 7, 5, 1)]);
        PersistenceStage::new(StageConfig::default())
            .run(&mut written, &env)
            .unwrap();

        let mut ctx = PipelineContext::default();
        StoreLoadStage::new(StageConfig::default())
            .run(&mut ctx, &env)
            .unwrap();

        assert_eq!(ctx.repositories, written.repositories);
        assert_eq!(ctx.contributors, written.contributors);
        assert_eq!(ctx.commits, written.commits);
        assert!(ctx.merge_requests.is_empty());
        assert_eq!(ctx.stats.entities_loaded, 4);
    }

    #[test]
    fn existing_collections_are_kept() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let env = StageEnv {
            store: Some(store),
            ..StageEnv::default()
        };
        let mut ctx =
            PipelineContext::default().with_repositories(vec![fixtures::repository(5, 0)]);

        StoreLoadStage::new(StageConfig::default())
            .run(&mut ctx, &env)
            .unwrap();

        assert_eq!(ctx.repositories.len(), 1);
        assert_eq!(ctx.stats.entities_loaded, 0);
    }

    #[test]
    fn requires_a_store() {
        let err = StoreLoadStage::new(StageConfig::default())
            .run(&mut PipelineContext::default(), &StageEnv::default())
            .unwrap_err();
        assert!(matches!(err, ContribLensError::Config(_)));
    }
}

use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::pipeline::{
    partition_results, record_failures, ContextField, ItemError, PipelineContext, StageConfig,
    StageEnv,
};
use crate::store::{Statement, Store};

/// Writes entities, statistics and the ranking snapshot to the store.
///
/// Each logical update is one transaction; a failed one is rolled back and
/// recorded under its name while the others still commit.
#[derive(Debug, Clone)]
pub struct PersistenceStage {
    pub config: StageConfig,
}

impl PersistenceStage {
    pub const NAME: &'static str = "persistence";
    pub const REQUIRES: &'static [ContextField] = &[];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext, env: &StageEnv) -> Result<()> {
        let Some(store) = env.store.as_deref() else {
            warn!("No store configured, nothing persisted");
            return Ok(());
        };

        let updates = logical_updates(ctx)?;
        let results: Vec<_> = updates
            .into_iter()
            .map(|(name, statements)| write(store, name, &statements))
            .collect();

        let (written, failures) = partition_results(results);
        let persisted: usize = written.iter().sum();
        ctx.stats.records_persisted += persisted;
        record_failures(Self::NAME, self.config, ctx, failures)?;

        info!("Persisted {persisted} records");
        Ok(())
    }
}

fn write(store: &dyn Store, name: &str, statements: &[Statement]) -> std::result::Result<usize, ItemError> {
    store
        .transaction(statements)
        .map_err(|e| ItemError::new(name, "transaction rolled back").caused_by(e))
}

fn payload<T: Serialize>(value: &T) -> Result<Value> {
    Ok(Value::String(serde_json::to_string(value)?))
}

type LogicalUpdate = (&'static str, Vec<Statement>);

fn logical_updates(ctx: &PipelineContext) -> Result<Vec<LogicalUpdate>> {
    let now = json!(ctx.as_of.to_rfc3339());
    let mut updates: Vec<LogicalUpdate> = Vec::new();
    let mut push = |name: &'static str, statements: Vec<Statement>| {
        if !statements.is_empty() {
            updates.push((name, statements));
        }
    };

    push(
        "repositories",
        ctx.repositories
            .iter()
            .map(|r| {
                Ok(Statement::new(
                    "INSERT INTO repositories (id, full_name, stars, payload, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name,
                        stars = excluded.stars, payload = excluded.payload,
                        updated_at = excluded.updated_at",
                    vec![json!(r.id), json!(r.full_name), json!(r.stars), payload(r)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "contributors",
        ctx.contributors
            .iter()
            .map(|c| {
                Ok(Statement::new(
                    "INSERT INTO contributors (id, login, followers, payload, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET login = excluded.login,
                        followers = excluded.followers, payload = excluded.payload,
                        updated_at = excluded.updated_at",
                    vec![json!(c.id), json!(c.login), json!(c.followers), payload(c)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "merge-requests",
        ctx.merge_requests
            .iter()
            .map(|m| {
                Ok(Statement::new(
                    "INSERT OR REPLACE INTO merge_requests
                        (id, repository_id, author_id, additions, deletions, merged, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    vec![
                        json!(m.id),
                        json!(m.repository_id),
                        json!(m.author_id),
                        json!(m.additions),
                        json!(m.deletions),
                        json!(m.merged),
                        payload(m)?,
                    ],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "commits",
        ctx.commits
            .iter()
            .map(|c| {
                Ok(Statement::new(
                    "INSERT INTO commits
                        (sha, repository_id, author_id, merge_request_id, additions, deletions, authored_at, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(sha) DO UPDATE SET repository_id = excluded.repository_id,
                        author_id = excluded.author_id,
                        merge_request_id = COALESCE(excluded.merge_request_id, commits.merge_request_id),
                        additions = excluded.additions, deletions = excluded.deletions,
                        authored_at = excluded.authored_at,
                        payload = CASE
                            WHEN excluded.merge_request_id IS NULL AND commits.merge_request_id IS NOT NULL
                            THEN json_set(excluded.payload, '$.merge_request_id', commits.merge_request_id)
                            ELSE excluded.payload
                        END",
                    vec![
                        json!(c.sha),
                        json!(c.repository_id),
                        json!(c.author_id),
                        json!(c.merge_request_id),
                        json!(c.additions),
                        json!(c.deletions),
                        json!(c.authored_at.map(|at| at.to_rfc3339())),
                        payload(c)?,
                    ],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "repository-statistics",
        ctx.repository_statistics
            .values()
            .map(|s| {
                Ok(Statement::new(
                    "INSERT OR REPLACE INTO repository_statistics (repository_id, health_score, payload, calculated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    vec![json!(s.repository_id), json!(s.health_score), payload(s)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "commit-statistics",
        ctx.commit_statistics
            .values()
            .map(|s| {
                Ok(Statement::new(
                    "INSERT OR REPLACE INTO commit_statistics (sha, complexity_score, payload, calculated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    vec![json!(s.sha), json!(s.complexity_score), payload(s)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "merge-request-statistics",
        ctx.merge_request_statistics
            .values()
            .map(|s| {
                Ok(Statement::new(
                    "INSERT OR REPLACE INTO merge_request_statistics (merge_request_id, cycle_time_hours, payload, calculated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    vec![json!(s.merge_request_id), json!(s.cycle_time_hours), payload(s)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    push(
        "contributor-statistics",
        ctx.contributor_statistics
            .values()
            .map(|s| {
                Ok(Statement::new(
                    "INSERT OR REPLACE INTO contributor_statistics (contributor_id, impact_score, payload, calculated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    vec![json!(s.contributor_id), json!(s.impact_score), payload(s)?, now.clone()],
                ))
            })
            .collect::<Result<_>>()?,
    );

    if let Some(relationships) = &ctx.relationships {
        push(
            "relationships",
            relationships
                .contributor_repository
                .iter()
                .map(|link| {
                    Ok(Statement::new(
                        "INSERT OR REPLACE INTO contributor_relationships
                            (contributor_id, repository_id, commit_count, lines_changed, merge_request_count, payload)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        vec![
                            json!(link.contributor_id),
                            json!(link.repository_id),
                            json!(link.commit_count),
                            json!(link.lines_changed),
                            json!(link.merge_request_count),
                            payload(link)?,
                        ],
                    ))
                })
                .collect::<Result<_>>()?,
        );
    }

    // The snapshot is replaced even when empty.
    if let Some(rankings) = &ctx.rankings {
        let mut statements = vec![Statement::new("DELETE FROM contributor_rankings", vec![])];
        for record in rankings {
            statements.push(Statement::new(
                "INSERT INTO contributor_rankings
                    (rank_position, contributor_id, login, total_score, payload, calculated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                vec![
                    json!(record.rank_position),
                    json!(record.contributor_id),
                    json!(record.login),
                    json!(record.total_score),
                    payload(record)?,
                    json!(record.calculation_timestamp.to_rfc3339()),
                ],
            ));
        }
        push("rankings", statements);
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{ContributorRankingRecord, RankingComponents, RawMetrics};
    use crate::stages::fixtures;
    use crate::store::{load_rankings, SqliteStore};

    fn env(store: Arc<dyn Store>) -> StageEnv {
        StageEnv {
            store: Some(store),
            ..StageEnv::default()
        }
    }

    fn ranking(position: usize, id: u64) -> ContributorRankingRecord {
        ContributorRankingRecord {
            contributor_id: id,
            login: format!("user{id}"),
            rank_position: position,
            total_score: 90.0 - position as f64,
            components: RankingComponents::default(),
            raw_metrics: RawMetrics::default(),
            calculation_timestamp: fixtures::as_of(),
        }
    }

    fn count(store: &dyn Store, table: &str) -> Value {
        store
            .query(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
            .unwrap()[0]["n"]
            .clone()
    }

    #[test]
    fn writes_entities_and_replaces_ranking_snapshot() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let stage = PersistenceStage::new(StageConfig::default());

        let mut ctx = PipelineContext::new(fixtures::as_of())
            .with_repositories(vec![fixtures::repository(1, 10)])
            .with_contributors(vec![fixtures::contributor(7, "octo")]);
        ctx.rankings = Some(vec![ranking(1, 7), ranking(2, 8), ranking(3, 9)]);
        stage.run(&mut ctx, &env(store.clone())).unwrap();

        ctx.rankings = Some(vec![ranking(1, 9)]);
        stage.run(&mut ctx, &env(store.clone())).unwrap();

        assert_eq!(count(store.as_ref(), "repositories"), json!(1));
        let snapshot = load_rankings(store.as_ref(), 10).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].contributor_id, 9);
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn failed_update_is_rolled_back_and_recorded() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .execute("DROP TABLE commit_statistics", &[])
            .unwrap();

        let mut ctx = PipelineContext::new(fixtures::as_of())
            .with_repositories(vec![fixtures::repository(1, 10)]);
        ctx.commit_statistics.insert(
            "a".into(),
            crate::stages::commit_stats::commit_statistics(&fixtures::commit("a", 1, 1, 1, 0)),
        );

        PersistenceStage::new(StageConfig::default())
            .run(&mut ctx, &env(store.clone()))
            .unwrap();

        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].item_id.as_deref(), Some("commit-statistics"));
        assert_eq!(count(store.as_ref(), "repositories"), json!(1));
    }

    #[test]
    fn upsert_keeps_stored_code_efficiency() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let stage = PersistenceStage::new(StageConfig::default());
        let mut ctx = PipelineContext::new(fixtures::as_of())
            .with_contributors(vec![fixtures::contributor(7, "octo")]);

        stage.run(&mut ctx, &env(store.clone())).unwrap();
        store
            .execute("UPDATE contributors SET code_efficiency = 88.0", &[])
            .unwrap();
        ctx.contributors[0].followers = 12;
        stage.run(&mut ctx, &env(store.clone())).unwrap();

        let row = &store
            .query("SELECT followers, code_efficiency FROM contributors", &[])
            .unwrap()[0];
        assert_eq!(row["followers"], json!(12));
        assert_eq!(row["code_efficiency"], json!(88.0));
    }

    #[test]
    fn unlinked_commit_keeps_stored_merge_request_link() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let stage = PersistenceStage::new(StageConfig::default());

        let mut linked = fixtures::commit("a", 1, 7, 5, 0);
        linked.merge_request_id = Some(10);
        let mut ctx = PipelineContext::new(fixtures::as_of()).with_commits(vec![linked]);
        stage.run(&mut ctx, &env(store.clone())).unwrap();

        let mut ctx = PipelineContext::new(fixtures::as_of())
            .with_commits(vec![fixtures::commit("a", 1, 7, 6, 0)]);
        stage.run(&mut ctx, &env(store.clone())).unwrap();

        let row = &store
            .query("SELECT merge_request_id, additions, payload FROM commits", &[])
            .unwrap()[0];
        assert_eq!(row["merge_request_id"], json!(10));
        assert_eq!(row["additions"], json!(6));
        let payload: Value = serde_json::from_str(row["payload"].as_str().unwrap()).unwrap();
        assert_eq!(payload["merge_request_id"], json!(10));
    }

    #[test]
    fn without_store_nothing_happens() {
        let mut ctx = PipelineContext::default()
            .with_repositories(vec![fixtures::repository(1, 10)]);
        PersistenceStage::new(StageConfig::default())
            .run(&mut ctx, &StageEnv::default())
            .unwrap();
        assert_eq!(ctx.stats.records_persisted, 0);
    }
}

use log::{debug, info};

use crate::error::Result;
use crate::models::{RawPayload, RawPullRequest, RawRepository, RawUser};
use crate::pipeline::{
    partition_results, record_failures, ContextField, ItemError, PipelineContext, StageConfig,
};

/// Turns raw payloads into repositories, contributors, merge requests and
/// commits.
#[derive(Debug, Clone)]
pub struct ExtractionStage {
    pub config: StageConfig,
}

impl ExtractionStage {
    pub const NAME: &'static str = "extraction";
    pub const REQUIRES: &'static [ContextField] = &[ContextField::RawData];

    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        let parsed: Vec<_> = ctx
            .raw_items()
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<RawPayload>(item.clone()).map_err(|e| {
                    ItemError::new(index.to_string(), "malformed payload").caused_by(e)
                })
            })
            .collect();

        let (payloads, failures) = partition_results(parsed);
        record_failures(Self::NAME, self.config, ctx, failures)?;

        for payload in payloads {
            absorb_payload(ctx, payload);
        }

        info!(
            "Extracted {} repositories, {} contributors, {} merge requests, {} commits from {} payloads",
            ctx.repositories.len(),
            ctx.contributors.len(),
            ctx.merge_requests.len(),
            ctx.commits.len(),
            ctx.stats.payloads_processed
        );
        Ok(())
    }
}

fn absorb_payload(ctx: &mut PipelineContext, payload: RawPayload) {
    let repository_id = payload.repository.as_ref().map(|r| r.id);
    let sender_id = payload.sender.as_ref().map(|s| s.id);

    if let Some(raw) = payload.repository {
        upsert_repository(ctx, raw);
    }

    let merge_request_id = payload
        .pull_request
        .map(|raw| upsert_merge_request(ctx, raw, repository_id, sender_id));

    for raw in payload.commits {
        let mut commit = raw.into_commit(repository_id, payload.sender.as_ref());
        commit.merge_request_id = merge_request_id;

        if let Some(mr_id) = merge_request_id {
            if let Some(mr) = ctx.merge_requests.iter_mut().find(|m| m.id == mr_id) {
                if !mr.commit_shas.contains(&commit.sha) {
                    mr.commit_shas.push(commit.sha.clone());
                }
            }
        }

        match ctx.commits.iter_mut().find(|c| c.sha == commit.sha) {
            Some(existing) => {
                // A later push of the same sha carries no pull request.
                if commit.merge_request_id.is_none() {
                    commit.merge_request_id = existing.merge_request_id;
                }
                *existing = commit;
            }
            None => {
                debug!("Extracted commit {}", commit.sha);
                ctx.commits.push(commit);
                ctx.stats.commits_extracted += 1;
            }
        }
    }

    if let Some(raw) = payload.sender {
        upsert_contributor(ctx, raw);
    }

    ctx.stats.payloads_processed += 1;
}

fn upsert_repository(ctx: &mut PipelineContext, raw: RawRepository) {
    match ctx.repositories.iter_mut().find(|r| r.id == raw.id) {
        Some(existing) => raw.merge_into(existing),
        None => {
            debug!("Extracted repository {}", raw.id);
            ctx.repositories.push(raw.into_repository());
            ctx.stats.repositories_extracted += 1;
        }
    }
}

fn upsert_contributor(ctx: &mut PipelineContext, raw: RawUser) {
    match ctx.contributors.iter_mut().find(|c| c.id == raw.id) {
        Some(existing) => raw.merge_into(existing),
        None => {
            debug!("Extracted contributor {}", raw.login);
            ctx.contributors.push(raw.into_contributor());
            ctx.stats.contributors_extracted += 1;
        }
    }
}

fn upsert_merge_request(
    ctx: &mut PipelineContext,
    raw: RawPullRequest,
    repository_id: Option<u64>,
    sender_id: Option<u64>,
) -> u64 {
    let id = raw.id;
    let mr = match ctx.merge_requests.iter().position(|m| m.id == id) {
        Some(index) => {
            let existing = &mut ctx.merge_requests[index];
            raw.merge_into(existing);
            if existing.repository_id.is_none() {
                existing.repository_id = repository_id;
            }
            existing
        }
        None => {
            ctx.merge_requests.push(raw.into_merge_request(repository_id));
            ctx.stats.merge_requests_extracted += 1;
            let last = ctx.merge_requests.len() - 1;
            &mut ctx.merge_requests[last]
        }
    };

    if let Some(sender) = sender_id {
        if !mr.participants.contains(&sender) {
            mr.participants.push(sender);
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContribLensError;
    use serde_json::json;

    fn run(raw: serde_json::Value) -> PipelineContext {
        let mut ctx = PipelineContext::default().with_raw_data(raw);
        ExtractionStage::new(StageConfig::default())
            .run(&mut ctx)
            .unwrap();
        ctx
    }

    #[test]
    fn pull_request_payload_links_commits() {
        let ctx = run(json!({
            "repository": {"id": 1, "name": "widgets", "full_name": "acme/widgets"},
            "sender": {"id": 7, "login": "octo"},
            "pull_request": {"id": 55, "number": 3, "user": {"id": 8, "login": "author"}, "additions": 10},
            "commits": [{"sha": "a1", "author": {"id": 8}, "additions": 10}]
        }));

        assert_eq!(ctx.merge_requests.len(), 1);
        let mr = &ctx.merge_requests[0];
        assert_eq!(mr.repository_id, Some(1));
        assert_eq!(mr.commit_shas, vec!["a1".to_string()]);
        assert_eq!(mr.participants, vec![8, 7]);
        assert_eq!(ctx.commits[0].merge_request_id, Some(55));
        assert_eq!(ctx.commits[0].repository_id, Some(1));
        assert_eq!(ctx.contributors[0].login, "octo");
    }

    #[test]
    fn push_after_pull_request_keeps_commit_link() {
        let ctx = run(json!([
            {
                "repository": {"id": 1, "name": "widgets"},
                "pull_request": {"id": 10, "number": 1, "user": {"id": 8, "login": "author"}, "additions": 5},
                "commits": [{"sha": "a", "author": {"id": 8}, "additions": 5}]
            },
            {
                "repository": {"id": 1, "name": "widgets"},
                "commits": [{"sha": "a", "author": {"id": 8}, "additions": 5}]
            },
        ]));

        assert_eq!(ctx.commits.len(), 1);
        assert_eq!(ctx.commits[0].merge_request_id, Some(10));
        assert_eq!(ctx.merge_requests[0].commit_shas, vec!["a".to_string()]);
        assert_eq!(ctx.stats.commits_extracted, 1);
    }

    #[test]
    fn repeated_entities_are_merged_in_place() {
        let ctx = run(json!([
            {"repository": {"id": 1, "name": "a", "stargazers_count": 3}},
            {"repository": {"id": 2, "name": "b"}},
            {"repository": {"id": 1, "name": "a", "stargazers_count": 9}},
        ]));

        let ids: Vec<_> = ctx.repositories.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(ctx.repositories[0].stars, 9);
        assert_eq!(ctx.stats.repositories_extracted, 2);
        assert_eq!(ctx.stats.payloads_processed, 3);
    }

    #[test]
    fn malformed_items_are_recorded_by_index() {
        let ctx = run(json!([
            {"repository": {"id": 1, "name": "a"}},
            "not an object",
            {"sender": {"login": "missing-id"}},
        ]));

        assert_eq!(ctx.repositories.len(), 1);
        let ids: Vec<_> = ctx.errors.iter().map(|e| e.item_id.clone()).collect();
        assert_eq!(ids, vec![Some("1".to_string()), Some("2".to_string())]);
        assert!(ctx.errors.iter().all(|e| e.stage == "extraction"));
        assert_eq!(ctx.stats.items_failed, 2);
    }

    #[test]
    fn abort_on_error_stops_before_absorbing() {
        let mut ctx = PipelineContext::default().with_raw_data(json!([
            {"repository": {"id": 1, "name": "a"}},
            42,
        ]));
        let err = ExtractionStage::new(StageConfig {
            abort_on_error: true,
        })
        .run(&mut ctx)
        .unwrap_err();

        assert!(matches!(err, ContribLensError::ItemFailed { ref item_id, .. } if item_id == "1"));
        assert!(ctx.repositories.is_empty());
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let ctx = run(json!({}));
        assert!(ctx.repositories.is_empty());
        assert!(ctx.commits.is_empty());
        assert!(ctx.errors.is_empty());
        assert_eq!(ctx.stats.payloads_processed, 1);
    }
}

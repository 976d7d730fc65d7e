//! Wire shapes of upstream payloads.
//!
//! Webhook deliveries and REST responses describe the same objects with
//! slightly different fields, so everything beyond the identifiers is
//! optional and conversion into entities happens here.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use super::{Commit, Contributor, MergeRequest, Repository};

/// One webhook/API delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPayload {
    pub repository: Option<RawRepository>,
    #[serde(alias = "user")]
    pub sender: Option<RawUser>,
    pub pull_request: Option<RawPullRequest>,
    #[serde(default)]
    pub commits: Vec<RawCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOwner {
    pub login: Option<String>,
    #[serde(alias = "name")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRepository {
    pub id: u64,
    pub name: String,
    pub full_name: Option<String>,
    pub owner: Option<RawOwner>,
    pub description: Option<String>,
    #[serde(alias = "stars")]
    pub stargazers_count: Option<u64>,
    pub forks_count: Option<u64>,
    pub open_issues_count: Option<u64>,
    pub language: Option<String>,
    pub topics: Option<Vec<String>>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub pushed_at: Option<DateTime<Utc>>,
}

impl RawRepository {
    fn owner_login(&self) -> Option<String> {
        self.owner
            .as_ref()
            .and_then(|o| o.login.clone().or_else(|| o.username.clone()))
    }

    pub fn into_repository(self) -> Repository {
        let owner = self.owner_login();
        let full_name = self.full_name.unwrap_or_else(|| match &owner {
            Some(owner) => format!("{owner}/{}", self.name),
            None => self.name.clone(),
        });

        Repository {
            id: self.id,
            name: self.name,
            full_name,
            owner,
            description: self.description,
            stars: self.stargazers_count.unwrap_or(0),
            forks: self.forks_count.unwrap_or(0),
            open_issues: self.open_issues_count.unwrap_or(0),
            language: self.language,
            languages: Default::default(),
            topics: self.topics.unwrap_or_default(),
            contributor_count: None,
            star_events: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            pushed_at: self.pushed_at,
        }
    }

    /// Overwrites every field of `repo` this payload carries a value for.
    pub fn merge_into(self, repo: &mut Repository) {
        if let Some(owner) = self.owner_login() {
            repo.owner = Some(owner);
        }
        if let Some(full_name) = self.full_name {
            repo.full_name = full_name;
        }
        repo.name = self.name;
        if self.description.is_some() {
            repo.description = self.description;
        }
        if let Some(stars) = self.stargazers_count {
            repo.stars = stars;
        }
        if let Some(forks) = self.forks_count {
            repo.forks = forks;
        }
        if let Some(open_issues) = self.open_issues_count {
            repo.open_issues = open_issues;
        }
        if self.language.is_some() {
            repo.language = self.language;
        }
        if let Some(topics) = self.topics {
            repo.topics = topics;
        }
        repo.created_at = self.created_at.or(repo.created_at);
        repo.updated_at = self.updated_at.or(repo.updated_at);
        repo.pushed_at = self.pushed_at.or(repo.pushed_at);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub public_repos: Option<u64>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Upstream sends empty strings for unset profile fields.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawUser {
    pub fn into_contributor(self) -> Contributor {
        Contributor {
            id: self.id,
            login: self.login,
            name: non_empty(self.name),
            avatar_url: non_empty(self.avatar_url),
            bio: non_empty(self.bio),
            company: non_empty(self.company),
            location: non_empty(self.location),
            blog: non_empty(self.blog),
            twitter_username: non_empty(self.twitter_username),
            followers: self.followers.unwrap_or(0),
            following: self.following.unwrap_or(0),
            public_repos: self.public_repos.unwrap_or(0),
            top_languages: Vec::new(),
            created_at: self.created_at,
        }
    }

    pub fn merge_into(self, contributor: &mut Contributor) {
        contributor.login = self.login;
        let overwrite = |slot: &mut Option<String>, value: Option<String>| {
            if let Some(value) = non_empty(value) {
                *slot = Some(value);
            }
        };
        overwrite(&mut contributor.name, self.name);
        overwrite(&mut contributor.avatar_url, self.avatar_url);
        overwrite(&mut contributor.bio, self.bio);
        overwrite(&mut contributor.company, self.company);
        overwrite(&mut contributor.location, self.location);
        overwrite(&mut contributor.blog, self.blog);
        overwrite(&mut contributor.twitter_username, self.twitter_username);
        if let Some(followers) = self.followers {
            contributor.followers = followers;
        }
        if let Some(following) = self.following {
            contributor.following = following;
        }
        if let Some(public_repos) = self.public_repos {
            contributor.public_repos = public_repos;
        }
        contributor.created_at = self.created_at.or(contributor.created_at);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPullRequest {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub state: Option<String>,
    pub merged: Option<bool>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Option<u64>,
    pub comments: Option<u64>,
    pub review_comments: Option<u64>,
    pub user: Option<RawUser>,
    #[serde(default)]
    pub assignees: Vec<RawUser>,
    #[serde(default)]
    pub requested_reviewers: Vec<RawUser>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl RawPullRequest {
    fn participant_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::new();
        let people = self
            .user
            .iter()
            .chain(&self.assignees)
            .chain(&self.requested_reviewers);
        for person in people {
            if !ids.contains(&person.id) {
                ids.push(person.id);
            }
        }
        ids
    }

    pub fn into_merge_request(self, repository_id: Option<u64>) -> MergeRequest {
        let participants = self.participant_ids();
        MergeRequest {
            id: self.id,
            number: self.number,
            repository_id,
            author_id: self.user.as_ref().map(|u| u.id),
            title: self.title,
            state: self.state.unwrap_or_else(|| "open".to_string()),
            merged: self.merged.unwrap_or(self.merged_at.is_some()),
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            changed_files: self.changed_files.unwrap_or(0),
            comments: self.comments.unwrap_or(0),
            review_comments: self.review_comments.unwrap_or(0),
            participants,
            commit_shas: Vec::new(),
            created_at: self.created_at,
            merged_at: self.merged_at,
            closed_at: self.closed_at,
        }
    }

    pub fn merge_into(self, mr: &mut MergeRequest) {
        for id in self.participant_ids() {
            if !mr.participants.contains(&id) {
                mr.participants.push(id);
            }
        }
        if let Some(user) = &self.user {
            mr.author_id = Some(user.id);
        }
        if !self.title.is_empty() {
            mr.title = self.title;
        }
        if let Some(state) = self.state {
            mr.state = state;
        }
        if let Some(merged) = self.merged {
            mr.merged = merged;
        }
        if let Some(additions) = self.additions {
            mr.additions = additions;
        }
        if let Some(deletions) = self.deletions {
            mr.deletions = deletions;
        }
        if let Some(changed_files) = self.changed_files {
            mr.changed_files = changed_files;
        }
        if let Some(comments) = self.comments {
            mr.comments = comments;
        }
        if let Some(review_comments) = self.review_comments {
            mr.review_comments = review_comments;
        }
        mr.created_at = self.created_at.or(mr.created_at);
        mr.merged_at = self.merged_at.or(mr.merged_at);
        mr.closed_at = self.closed_at.or(mr.closed_at);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommitAuthor {
    pub id: Option<u64>,
    #[serde(alias = "username")]
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommitStats {
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommit {
    #[serde(alias = "sha")]
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub author: Option<RawCommitAuthor>,
    pub stats: Option<RawCommitStats>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub files_changed: Option<u64>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(
        default,
        alias = "authored_at",
        deserialize_with = "flexible_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawCommit {
    /// Converts into a commit; `sender` attributes push commits whose author
    /// only carries a username.
    pub fn into_commit(self, repository_id: Option<u64>, sender: Option<&RawUser>) -> Commit {
        let author_id = self.author.as_ref().and_then(|author| {
            author.id.or_else(|| {
                let login = author.login.as_deref()?;
                sender.filter(|s| s.login == login).map(|s| s.id)
            })
        });

        let (additions, deletions) = match &self.stats {
            Some(stats) => (stats.additions, stats.deletions),
            None => (self.additions.unwrap_or(0), self.deletions.unwrap_or(0)),
        };

        let files_changed = self
            .files_changed
            .unwrap_or((self.added.len() + self.removed.len() + self.modified.len()) as u64);

        Commit {
            sha: self.id,
            repository_id,
            author_id,
            message: self.message,
            additions,
            deletions,
            files_changed,
            merge_request_id: None,
            authored_at: self.timestamp,
        }
    }
}

/// Accepts RFC 3339 strings, unix seconds, or null.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Text(String),
        Seconds(i64),
    }

    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Timestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Some(Timestamp::Seconds(secs)) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid unix timestamp {secs}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_payload_commit_is_attributed_to_sender() {
        let payload: RawPayload = serde_json::from_value(json!({
            "repository": {"id": 1, "name": "repo", "owner": {"name": "acme"}, "created_at": 1_700_000_000},
            "sender": {"id": 7, "login": "octo"},
            "commits": [{
                "id": "abc",
                "message": "fix",
                "timestamp": "2024-03-01T10:00:00Z",
                "author": {"name": "Octo", "username": "octo"},
                "added": ["a.rs"],
                "modified": ["b.rs", "c.rs"]
            }]
        }))
        .unwrap();

        let sender = payload.sender.clone();
        let repo = payload.repository.unwrap().into_repository();
        assert_eq!(repo.full_name, "acme/repo");
        assert!(repo.created_at.is_some());

        let commit = payload.commits[0]
            .clone()
            .into_commit(Some(repo.id), sender.as_ref());
        assert_eq!(commit.author_id, Some(7));
        assert_eq!(commit.files_changed, 3);
        assert_eq!(commit.changes(), 0);
    }

    #[test]
    fn rest_commit_shape_uses_stats() {
        let commit: RawCommit = serde_json::from_value(json!({
            "sha": "def",
            "author": {"id": 3, "login": "someone"},
            "stats": {"additions": 10, "deletions": 4}
        }))
        .unwrap();

        let commit = commit.into_commit(None, None);
        assert_eq!(commit.sha, "def");
        assert_eq!(commit.author_id, Some(3));
        assert_eq!(commit.changes(), 14);
    }

    #[test]
    fn pull_request_participants_include_author_once() {
        let pr: RawPullRequest = serde_json::from_value(json!({
            "id": 100,
            "number": 5,
            "user": {"id": 1, "login": "a"},
            "assignees": [{"id": 1, "login": "a"}, {"id": 2, "login": "b"}],
            "requested_reviewers": [{"id": 3, "login": "c"}],
            "merged_at": "2024-03-02T00:00:00Z"
        }))
        .unwrap();

        let mr = pr.into_merge_request(Some(9));
        assert_eq!(mr.participants, vec![1, 2, 3]);
        assert_eq!(mr.author_id, Some(1));
        assert!(mr.merged);
        assert_eq!(mr.state, "open");
    }

    #[test]
    fn empty_profile_strings_are_treated_as_missing() {
        let user: RawUser = serde_json::from_value(json!({
            "id": 1, "login": "a", "bio": "", "company": "  ", "blog": "https://a.dev"
        }))
        .unwrap();

        let contributor = user.into_contributor();
        assert_eq!(contributor.bio, None);
        assert_eq!(contributor.company, None);
        assert_eq!(contributor.blog.as_deref(), Some("https://a.dev"));
    }

    #[test]
    fn merge_keeps_existing_values_when_payload_is_silent() {
        let mut repo = RawRepository {
            id: 1,
            name: "r".into(),
            full_name: Some("o/r".into()),
            owner: None,
            description: Some("desc".into()),
            stargazers_count: Some(10),
            forks_count: None,
            open_issues_count: None,
            language: Some("Rust".into()),
            topics: None,
            created_at: None,
            updated_at: None,
            pushed_at: None,
        }
        .into_repository();
        repo.forks = 4;

        let update: RawRepository = serde_json::from_value(json!({
            "id": 1, "name": "r", "stargazers_count": 25
        }))
        .unwrap();
        update.merge_into(&mut repo);

        assert_eq!(repo.stars, 25);
        assert_eq!(repo.forks, 4);
        assert_eq!(repo.full_name, "o/r");
        assert_eq!(repo.description.as_deref(), Some("desc"));
    }
}

pub(super) const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS repositories (
    id          INTEGER PRIMARY KEY,
    full_name   TEXT NOT NULL,
    stars       INTEGER NOT NULL DEFAULT 0,
    payload     TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contributors (
    id               INTEGER PRIMARY KEY,
    login            TEXT NOT NULL,
    followers        INTEGER NOT NULL DEFAULT 0,
    code_efficiency  REAL,
    payload          TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS merge_requests (
    id             INTEGER PRIMARY KEY,
    repository_id  INTEGER,
    author_id      INTEGER,
    additions      INTEGER NOT NULL DEFAULT 0,
    deletions      INTEGER NOT NULL DEFAULT 0,
    merged         INTEGER NOT NULL DEFAULT 0,
    payload        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commits (
    sha               TEXT PRIMARY KEY,
    repository_id     INTEGER,
    author_id         INTEGER,
    merge_request_id  INTEGER,
    additions         INTEGER NOT NULL DEFAULT 0,
    deletions         INTEGER NOT NULL DEFAULT 0,
    authored_at       TEXT,
    payload           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commits_merge_request ON commits (merge_request_id);

CREATE TABLE IF NOT EXISTS repository_statistics (
    repository_id  INTEGER PRIMARY KEY,
    health_score   REAL NOT NULL,
    payload        TEXT NOT NULL,
    calculated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commit_statistics (
    sha               TEXT PRIMARY KEY,
    complexity_score  REAL NOT NULL,
    payload           TEXT NOT NULL,
    calculated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS merge_request_statistics (
    merge_request_id  INTEGER PRIMARY KEY,
    cycle_time_hours  REAL,
    payload           TEXT NOT NULL,
    calculated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contributor_statistics (
    contributor_id  INTEGER PRIMARY KEY,
    impact_score    REAL NOT NULL,
    payload         TEXT NOT NULL,
    calculated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contributor_relationships (
    contributor_id       INTEGER NOT NULL,
    repository_id        INTEGER NOT NULL,
    commit_count         INTEGER NOT NULL,
    lines_changed        INTEGER NOT NULL,
    merge_request_count  INTEGER NOT NULL,
    payload              TEXT NOT NULL,
    PRIMARY KEY (contributor_id, repository_id)
);

CREATE TABLE IF NOT EXISTS contributor_rankings (
    rank_position   INTEGER PRIMARY KEY,
    contributor_id  INTEGER NOT NULL,
    login           TEXT NOT NULL,
    total_score     REAL NOT NULL,
    payload         TEXT NOT NULL,
    calculated_at   TEXT NOT NULL
);
"#;

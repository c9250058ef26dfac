//! SQL schema for the citegraph SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS groups (
    group_id    TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,   -- 'identity' | 'version'
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS group_metadata (
    group_id    TEXT PRIMARY KEY REFERENCES groups(group_id) ON DELETE CASCADE,
    document    TEXT NOT NULL,   -- JSON object
    attached_at TEXT NOT NULL,
    version     INTEGER NOT NULL
);

-- Each identifier is owned by exactly one identity group. Rows are never
-- deleted; merges only reassign group_id.
CREATE TABLE IF NOT EXISTS identifiers (
    scheme      TEXT NOT NULL,
    value       TEXT NOT NULL,
    group_id    TEXT NOT NULL REFERENCES groups(group_id),
    created_at  TEXT NOT NULL,
    PRIMARY KEY (scheme, value)
);

-- Identity group -> version group. At most one row per identity group.
CREATE TABLE IF NOT EXISTS group_members (
    identity_id TEXT PRIMARY KEY REFERENCES groups(group_id),
    version_id  TEXT NOT NULL REFERENCES groups(group_id)
);

CREATE TABLE IF NOT EXISTS group_relationships (
    relationship_id TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    relation        TEXT NOT NULL,
    source_id       TEXT NOT NULL REFERENCES groups(group_id),
    target_id       TEXT NOT NULL REFERENCES groups(group_id),
    history         TEXT NOT NULL,   -- JSON array of evidence
    UNIQUE (kind, source_id, target_id, relation),
    CHECK  (source_id != target_id)
);

CREATE INDEX IF NOT EXISTS identifiers_group_idx ON identifiers(group_id);
CREATE INDEX IF NOT EXISTS members_version_idx   ON group_members(version_id);
CREATE INDEX IF NOT EXISTS relationships_src_idx ON group_relationships(source_id);
CREATE INDEX IF NOT EXISTS relationships_tgt_idx ON group_relationships(target_id);
CREATE INDEX IF NOT EXISTS groups_kind_idx       ON groups(kind);

PRAGMA user_version = 1;
";

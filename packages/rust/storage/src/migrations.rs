//! SQL migration definitions for the deepqa database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: questions, passages, FTS5, search_cache",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Questions with known answers (training / evaluation source)
CREATE TABLE IF NOT EXISTS questions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    question   TEXT NOT NULL UNIQUE,
    answer     TEXT,
    category   TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

-- Passage corpus for full-text search
CREATE TABLE IF NOT EXISTS passages (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    title  TEXT NOT NULL,
    body   TEXT NOT NULL,
    source TEXT NOT NULL,
    UNIQUE(source, title)
);

CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
    title,
    body,
    content=passages,
    content_rowid=id
);

CREATE TRIGGER IF NOT EXISTS passages_fts_insert AFTER INSERT ON passages BEGIN
    INSERT INTO passages_fts(rowid, title, body)
    VALUES (new.id, new.title, new.body);
END;

CREATE TRIGGER IF NOT EXISTS passages_fts_delete AFTER DELETE ON passages BEGIN
    INSERT INTO passages_fts(passages_fts, rowid, title, body)
    VALUES ('delete', old.id, old.title, old.body);
END;

CREATE TRIGGER IF NOT EXISTS passages_fts_update AFTER UPDATE ON passages BEGIN
    INSERT INTO passages_fts(passages_fts, rowid, title, body)
    VALUES ('delete', old.id, old.title, old.body);
    INSERT INTO passages_fts(rowid, title, body)
    VALUES (new.id, new.title, new.body);
END;

-- Cached searcher results, keyed by engine + query text
CREATE TABLE IF NOT EXISTS search_cache (
    id           TEXT PRIMARY KEY,
    engine       TEXT NOT NULL,
    query        TEXT NOT NULL,
    results_json TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE(engine, query)
);

CREATE INDEX IF NOT EXISTS idx_search_cache_query ON search_cache(query);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Training rows teed out of pipeline runs",
            sql: r#"
CREATE TABLE IF NOT EXISTS training_rows (
    id          TEXT PRIMARY KEY,
    question_id TEXT NOT NULL,
    question    TEXT NOT NULL,
    candidate   TEXT NOT NULL,
    is_correct  INTEGER,
    scores_json TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_training_rows_question ON training_rows(question_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

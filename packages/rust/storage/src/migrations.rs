//! SQL migration definitions for the payslip index database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

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
            description: "Initial schema: chunks",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexed chunks, keyed by content-addressed doc id
CREATE TABLE IF NOT EXISTS chunks (
    doc_id        TEXT PRIMARY KEY,
    section       TEXT NOT NULL,
    content       TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    indexed_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_section ON chunks(section);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Chunk embeddings",
            sql: r#"
-- Little-endian f32 vector, NULL when indexed without an embedder
ALTER TABLE chunks ADD COLUMN embedding BLOB;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

/// Version the schema reaches once every migration has run.
pub(crate) fn latest_version() -> u32 {
    all_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

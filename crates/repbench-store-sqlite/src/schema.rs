//! SQL schema for the three layouts.
//!
//! Executed once at connection startup. A store file holds exactly one
//! layout, recorded in `store_meta`; every statement is idempotent thanks to
//! `IF NOT EXISTS`.

use repbench_core::layout::LayoutKind;

pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

pub const META: &str = "
CREATE TABLE IF NOT EXISTS store_meta (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    layout  TEXT NOT NULL        -- 'denormalized' | 'join-table' | 'single-reference'
);
";

const RESOURCES: &str = "
CREATE TABLE IF NOT EXISTS resources (
    resource_id   TEXT PRIMARY KEY,
    resource_type TEXT NOT NULL,
    created_at    TEXT NOT NULL    -- ISO 8601 UTC
);
";

// Representation tables are strictly append-only.
// No UPDATE or DELETE is ever issued against them.
const COMMON_REPRESENTATIONS: &str = "
CREATE TABLE IF NOT EXISTS common_representations (
    representation_id TEXT PRIMARY KEY,
    resource_id       TEXT NOT NULL REFERENCES resources(resource_id),
    version           INTEGER NOT NULL,
    data              TEXT NOT NULL,   -- JSON object
    resource_type     TEXT NOT NULL,
    reporter_type     TEXT NOT NULL,   -- always 'inventory'
    reported_by       TEXT NOT NULL,
    UNIQUE (resource_id, version)
);
";

const DENORMALIZED: &str = "
CREATE TABLE IF NOT EXISTS reporter_representations (
    representation_id    TEXT PRIMARY KEY,
    resource_id          TEXT NOT NULL REFERENCES resources(resource_id),
    local_resource_id    TEXT NOT NULL,
    reporter_type        TEXT NOT NULL,
    resource_type        TEXT NOT NULL,
    reporter_instance_id TEXT NOT NULL,
    version              INTEGER NOT NULL,
    generation           INTEGER NOT NULL,
    common_version       INTEGER NOT NULL,
    tombstone            INTEGER NOT NULL DEFAULT 0,
    data                 TEXT NOT NULL,
    api_href             TEXT NOT NULL,
    console_href         TEXT NOT NULL,
    reporter_version     TEXT NOT NULL,
    UNIQUE (local_resource_id, reporter_type, resource_type, reporter_instance_id, version)
);

-- Mutable: one row per (resource, reporter type), updated in place.
CREATE TABLE IF NOT EXISTS representation_references (
    resource_id            TEXT NOT NULL REFERENCES resources(resource_id),
    local_resource_id      TEXT NOT NULL,
    reporter_type          TEXT NOT NULL,
    resource_type          TEXT NOT NULL,
    reporter_instance_id   TEXT NOT NULL,
    representation_version INTEGER NOT NULL,
    generation             INTEGER NOT NULL,
    tombstone              INTEGER NOT NULL DEFAULT 0,
    UNIQUE (local_resource_id, reporter_type, resource_type, reporter_instance_id),
    UNIQUE (resource_id, reporter_type)
);
";

const JOIN_TABLE: &str = "
CREATE TABLE IF NOT EXISTS reporter_representations (
    representation_id    TEXT PRIMARY KEY,
    resource_id          TEXT NOT NULL REFERENCES resources(resource_id),
    local_resource_id    TEXT NOT NULL,
    reporter_type        TEXT NOT NULL,
    resource_type        TEXT NOT NULL,
    reporter_instance_id TEXT NOT NULL,
    version              INTEGER NOT NULL,
    generation           INTEGER NOT NULL,
    common_version       INTEGER,
    tombstone            INTEGER NOT NULL DEFAULT 0,
    data                 TEXT NOT NULL,
    api_href             TEXT NOT NULL,
    console_href         TEXT NOT NULL,
    reporter_version     TEXT NOT NULL,
    UNIQUE (local_resource_id, reporter_type, resource_type, reporter_instance_id,
            version, generation)
);

-- One row per slot; exactly one pointer is set.
CREATE TABLE IF NOT EXISTS representation_references (
    reference_id               INTEGER PRIMARY KEY,
    resource_id                TEXT NOT NULL REFERENCES resources(resource_id),
    reporter_representation_id TEXT REFERENCES reporter_representations(representation_id),
    common_representation_id   TEXT REFERENCES common_representations(representation_id),
    CHECK ((reporter_representation_id IS NULL) <> (common_representation_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS references_one_reporter_idx
    ON representation_references(resource_id)
    WHERE reporter_representation_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS references_one_common_idx
    ON representation_references(resource_id)
    WHERE common_representation_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS references_reporter_ptr_idx
    ON representation_references(reporter_representation_id);
";

const SINGLE_REFERENCE: &str = "
-- One stream; each row snapshots both halves and names the half it introduced.
CREATE TABLE IF NOT EXISTS representations (
    representation_id          TEXT PRIMARY KEY,
    resource_id                TEXT NOT NULL REFERENCES resources(resource_id),
    written_slot               TEXT NOT NULL CHECK (written_slot IN ('common', 'reporter')),
    local_resource_id          TEXT NOT NULL,
    reporter_type              TEXT NOT NULL,
    resource_type              TEXT NOT NULL,
    reporter_instance_id       TEXT NOT NULL,
    common_representation_id   TEXT NOT NULL,
    common_version             INTEGER NOT NULL,
    common_data                TEXT NOT NULL,
    reported_by                TEXT NOT NULL,
    reporter_representation_id TEXT,
    reporter_rep_version       INTEGER,
    generation                 INTEGER,
    observed_common_version    INTEGER,
    tombstone                  INTEGER NOT NULL DEFAULT 0,
    reporter_data              TEXT,
    api_href                   TEXT,
    console_href               TEXT,
    reporter_version           TEXT,
    UNIQUE (resource_id, common_version, reporter_rep_version)
);

CREATE INDEX IF NOT EXISTS representations_key_idx
    ON representations(local_resource_id, reporter_type, resource_type, reporter_instance_id);

CREATE TABLE IF NOT EXISTS representation_references (
    resource_id       TEXT PRIMARY KEY REFERENCES resources(resource_id),
    representation_id TEXT NOT NULL UNIQUE REFERENCES representations(representation_id)
);
";

/// DDL batches for `kind`, in execution order.
pub fn schema_for(kind: LayoutKind) -> &'static [&'static str] {
  match kind {
    LayoutKind::Denormalized => &[RESOURCES, COMMON_REPRESENTATIONS, DENORMALIZED],
    LayoutKind::JoinTable => &[RESOURCES, COMMON_REPRESENTATIONS, JOIN_TABLE],
    LayoutKind::SingleReference => &[RESOURCES, SINGLE_REFERENCE],
  }
}

//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Processor table state, one row per (group, key).
#[derive(Iden)]
pub enum StateRecords {
    Table,
    #[iden = "group_name"]
    GroupName,
    #[iden = "record_key"]
    RecordKey,
    #[iden = "state_data"]
    StateData,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Consumer offsets, one row per (group, topic, partition).
#[derive(Iden)]
pub enum Offsets {
    Table,
    #[iden = "group_name"]
    GroupName,
    #[iden = "topic"]
    Topic,
    #[iden = "partition"]
    Partition,
    #[iden = "next_offset"]
    NextOffset,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Pending decay compensations.
#[derive(Iden)]
pub enum Compensations {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "record_key"]
    RecordKey,
    #[iden = "delta"]
    Delta,
    #[iden = "fire_at"]
    FireAt,
}

/// SQL for creating the state table.
pub const CREATE_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS state_records (
    group_name TEXT NOT NULL,
    record_key TEXT NOT NULL,
    state_data BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (group_name, record_key)
);
"#;

/// SQL for creating the offsets table.
pub const CREATE_OFFSETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS offsets (
    group_name TEXT NOT NULL,
    topic TEXT NOT NULL,
    partition INTEGER NOT NULL,
    next_offset INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (group_name, topic, partition)
);
"#;

/// SQL for creating the compensations table.
///
/// `fire_at` is RFC 3339 with fixed microsecond precision so that text
/// ordering matches time ordering.
pub const CREATE_COMPENSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS compensations (
    id TEXT PRIMARY KEY,
    record_key TEXT NOT NULL,
    delta INTEGER NOT NULL,
    fire_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_compensations_fire_at ON compensations(fire_at);
"#;

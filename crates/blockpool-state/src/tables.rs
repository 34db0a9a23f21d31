//! redb table definitions for the blockpool state store.
//!
//! Job and worker tables use integer keys and `&[u8]` values
//! (JSON-serialized domain types).

use redb::TableDefinition;

/// Simulated jobs keyed by job id.
pub const JOBS: TableDefinition<u64, &[u8]> = TableDefinition::new("jobs");

/// Workers keyed by pool ordinal.
pub const WORKERS: TableDefinition<u32, &[u8]> = TableDefinition::new("workers");

/// Counters keyed by name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in `META` holding the next job id to allocate.
pub const NEXT_JOB_ID: &str = "next_job_id";

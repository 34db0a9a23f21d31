//! blockpool-state — embedded state store for blockpool.
//!
//! Backed by [redb](https://docs.rs/redb), holds the simulated job and
//! worker records the scheduler and execution lanes read and update.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns under
//! integer keys, so a table scan yields jobs in creation order. Job ids
//! are allocated from a sequence kept in the `meta` table.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;

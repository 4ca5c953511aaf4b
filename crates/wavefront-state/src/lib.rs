//! wavefront-state — entity state table for wavefront releases.
//!
//! Holds the status of every node in a release tree:
//! Release → Wave → Cluster → Bundle → App.
//!
//! # Architecture
//!
//! Entity IDs are validated `{kind}:{identifier}` strings. Each release
//! instance owns one [`EntityTable`]; it is loaded from the planner's
//! output and then mutated only through forward-only transitions stamped
//! by a per-table logical clock. Snapshots are owned, serde-serializable
//! copies that never borrow from the table.

pub mod error;
pub mod id;
pub mod snapshot;
pub mod table;
pub mod types;

pub use error::{StateError, StateResult};
pub use id::{EntityId, EntityKind, MAX_ID_LEN};
pub use snapshot::*;
pub use table::{EntityTable, Transition};
pub use types::*;

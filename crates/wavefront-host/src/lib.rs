//! wavefront-host — runs release instances in-process.
//!
//! The [`Host`] is the outer surface: it starts instances, relays
//! cancellation and queries, tracks a host-side execution status per
//! instance, and can destroy an instance from outside. [`ReleaseView`]
//! puts the host's view and the release tree's own state side by side.

pub mod error;
pub mod host;
pub mod status;

pub use error::{HostError, HostResult};
pub use host::{Host, InstanceHandle};
pub use status::{reconcile, HostStatus, ReleaseView};

//! wavefront-engine — plans and drives hierarchical releases.
//!
//! # Architecture
//!
//! ```text
//! ReleasePlan ──plan()──▶ ReleaseTree ──▶ EntityTable (shared)
//!                                              ▲   │
//!          CancellationController ──▶ Engine ──┘   └──▶ QueryGateway
//!                                        │
//!                                        └──▶ Suspender (host-provided)
//! ```
//!
//! The [`Engine`] owns the only write access to its table. Readers go
//! through a [`QueryGateway`]; cancellation goes through a
//! [`CancellationController`]. Both can be obtained before the run
//! starts and stay valid after it ends.

pub mod cancel;
pub mod engine;
pub mod error;
pub mod failure;
pub mod plan;
pub mod query;
pub mod suspend;

pub use cancel::{cancellation, CancellationController, CancellationToken};
pub use engine::{Engine, ReleaseOutcome};
pub use error::{EngineError, EngineResult, PlanError, PlanResult, QueryError};
pub use failure::FailureLatch;
pub use plan::{plan, AppTarget, FailureScenario, ReleasePlan, ReleaseTree};
pub use query::{QueryGateway, QueryTarget, SharedTable, Snapshot};
pub use suspend::{Interrupted, ResumeToken, SleepRequest, Suspender, TokioSuspender};

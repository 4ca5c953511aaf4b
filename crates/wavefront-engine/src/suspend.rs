//! Suspension primitive provided by the host.
//!
//! The engine never sleeps on its own. Every unit of simulated work goes
//! through a [`Suspender`], identified by a unique [`ResumeToken`], so a
//! durable host can resume the engine exactly once at that point.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use wavefront_state::EntityId;

/// Identifies one suspension point of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeToken {
    pub entity: EntityId,
    /// Position of this suspension in the instance's sequence.
    pub seq: u64,
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.seq)
    }
}

/// A request to suspend for `duration`.
#[derive(Debug, Clone)]
pub struct SleepRequest {
    pub token: ResumeToken,
    pub duration: Duration,
    /// Hard limit imposed by the host. Exceeding it destroys the instance.
    pub deadline: Option<Duration>,
}

/// The host stopped the instance instead of resuming it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Interrupted {
    #[error("{entity} exceeded its {limit:?} timeout")]
    TimedOut { entity: EntityId, limit: Duration },

    #[error("terminated: {0}")]
    Terminated(String),

    #[error("suspension {0} resumed twice")]
    DuplicateResume(ResumeToken),
}

/// Durable suspend/resume, supplied by whatever hosts the engine.
pub trait Suspender: Send + Sync + 'static {
    fn sleep(&self, request: SleepRequest) -> impl Future<Output = Result<(), Interrupted>> + Send;
}

/// In-process suspender backed by the tokio timer.
///
/// Each token is honored at most once; a replayed token is rejected
/// rather than re-running the work behind it.
#[derive(Debug, Default)]
pub struct TokioSuspender {
    resumed: Mutex<HashSet<ResumeToken>>,
}

impl TokioSuspender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of suspensions that have been accepted so far.
    pub fn accepted(&self) -> usize {
        self.resumed.lock().map(|set| set.len()).unwrap_or(0)
    }

    fn claim(&self, token: &ResumeToken) -> Result<(), Interrupted> {
        let mut resumed = self
            .resumed
            .lock()
            .map_err(|_| Interrupted::Terminated("suspender state poisoned".to_string()))?;
        if !resumed.insert(token.clone()) {
            return Err(Interrupted::DuplicateResume(token.clone()));
        }
        Ok(())
    }
}

impl Suspender for TokioSuspender {
    async fn sleep(&self, request: SleepRequest) -> Result<(), Interrupted> {
        self.claim(&request.token)?;
        match request.deadline {
            Some(limit) if request.duration > limit => {
                tokio::time::sleep(limit).await;
                warn!(token = %request.token, ?limit, "suspension exceeded deadline");
                Err(Interrupted::TimedOut {
                    entity: request.token.entity,
                    limit,
                })
            }
            _ => {
                debug!(token = %request.token, duration = ?request.duration, "suspending");
                tokio::time::sleep(request.duration).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(seq: u64) -> ResumeToken {
        ResumeToken {
            entity: EntityId::parse("app:a").unwrap(),
            seq,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_requested_duration() {
        let suspender = TokioSuspender::new();
        let start = tokio::time::Instant::now();
        suspender
            .sleep(SleepRequest {
                token: token(1),
                duration: Duration::from_secs(3),
                deadline: None,
            })
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(suspender.accepted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_suspension_short() {
        let suspender = TokioSuspender::new();
        let start = tokio::time::Instant::now();
        let err = suspender
            .sleep(SleepRequest {
                token: token(1),
                duration: Duration::from_secs(10),
                deadline: Some(Duration::from_secs(2)),
            })
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(matches!(err, Interrupted::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_token_is_rejected() {
        let suspender = TokioSuspender::new();
        let req = SleepRequest {
            token: token(7),
            duration: Duration::from_millis(1),
            deadline: None,
        };
        suspender.sleep(req.clone()).await.unwrap();
        let err = suspender.sleep(req).await.unwrap_err();
        assert_eq!(err, Interrupted::DuplicateResume(token(7)));
    }
}

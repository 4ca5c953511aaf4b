//! Execution engine — drives one release tree to a terminal state.
//!
//! Traversal order: waves one after another, the clusters of a wave
//! concurrently, the apps of a bundle one after another. Cluster fan-out
//! happens inside the engine's own control flow (no spawned tasks), so
//! the table only ever has a single writer.
//!
//! Cancellation is polled before each wave and before each app. A
//! simulated app failure unwinds through bundle, cluster and wave to the
//! release, and no later wave is started.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use wavefront_state::{EntityId, EntityState, FailureReport};

use crate::cancel::{cancellation, CancellationController, CancellationToken};
use crate::error::{EngineResult, PlanResult};
use crate::failure::{app_failure, cancelled_by_user, FailureLatch};
use crate::plan::{plan, FailureScenario, ReleasePlan, ReleaseTree};
use crate::query::{QueryGateway, SharedTable};
use crate::suspend::{ResumeToken, SleepRequest, Suspender};

/// Terminal outcome of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Completed,
    Failed(FailureReport),
    Cancelled,
}

impl ReleaseOutcome {
    pub fn state(&self) -> EntityState {
        match self {
            ReleaseOutcome::Completed => EntityState::Completed,
            ReleaseOutcome::Failed(_) => EntityState::Failed,
            ReleaseOutcome::Cancelled => EntityState::Cancelled,
        }
    }
}

/// How a single unit (wave, cluster, bundle, app) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

impl Outcome {
    fn state(self) -> EntityState {
        match self {
            Outcome::Completed => EntityState::Completed,
            Outcome::Failed => EntityState::Failed,
            Outcome::Cancelled => EntityState::Cancelled,
        }
    }

    /// A failed child fails the parent; otherwise a cancelled child
    /// cancels it.
    fn merge(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
        outcomes
            .into_iter()
            .fold(Outcome::Completed, |acc, next| match (acc, next) {
                (Outcome::Failed, _) | (_, Outcome::Failed) => Outcome::Failed,
                (Outcome::Cancelled, _) | (_, Outcome::Cancelled) => Outcome::Cancelled,
                _ => Outcome::Completed,
            })
    }
}

/// Per-app behavior taken from the plan.
#[derive(Debug, Clone)]
struct AppSettings {
    deploy_duration: Duration,
    failure_scenario: FailureScenario,
    timeout: Option<Duration>,
}

/// One release instance's engine. Consumed by [`Engine::run`].
pub struct Engine<S: Suspender> {
    release: EntityId,
    tree: ReleaseTree,
    table: SharedTable,
    settings: AppSettings,
    controller: CancellationController,
    cancel: CancellationToken,
    /// Set once a cancellation has actually been acted on.
    cancel_processed: AtomicBool,
    failure: FailureLatch,
    suspender: Arc<S>,
    seq: AtomicU64,
}

impl<S: Suspender> Engine<S> {
    /// Plan the release and build its engine. Nothing is created if the
    /// plan is invalid.
    pub fn new(input: &ReleasePlan, suspender: Arc<S>) -> PlanResult<Self> {
        let tree = plan(input)?;
        let table = tree.to_table()?;
        let (controller, cancel) = cancellation();
        Ok(Self {
            release: tree.release_id().clone(),
            tree,
            table: Arc::new(RwLock::new(table)),
            settings: AppSettings {
                deploy_duration: input.app_deploy_duration,
                failure_scenario: input.failure_scenario.clone(),
                timeout: input.app_timeout,
            },
            controller,
            cancel,
            cancel_processed: AtomicBool::new(false),
            failure: FailureLatch::new(),
            suspender,
            seq: AtomicU64::new(0),
        })
    }

    pub fn release_id(&self) -> &EntityId {
        &self.release
    }

    /// Read handle that stays valid after the engine is gone.
    pub fn gateway(&self) -> QueryGateway {
        QueryGateway::new(self.table.clone())
    }

    pub fn canceller(&self) -> CancellationController {
        self.controller.clone()
    }

    /// Drive the release to its terminal state.
    ///
    /// Returns `Err(EngineError::Interrupted)` if the host stopped the
    /// instance; in that case the table keeps whatever it last showed.
    pub async fn run(self) -> EngineResult<ReleaseOutcome> {
        let waves = self.tree.waves().to_vec();
        info!(release = %self.release, waves = waves.len(), "release starting");
        self.set(&self.release, EntityState::Deploying).await?;

        for (i, wave) in waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.cancel_waves(&waves[i..]).await?;
                break;
            }
            if self.deploy_wave(wave).await? == Outcome::Failed {
                break;
            }
        }

        self.finish().await
    }

    async fn finish(&self) -> EngineResult<ReleaseOutcome> {
        let outcome = if let Some(report) = self.failure.get() {
            ReleaseOutcome::Failed(report.clone())
        } else if self.cancel_processed.load(Ordering::SeqCst) {
            ReleaseOutcome::Cancelled
        } else {
            ReleaseOutcome::Completed
        };

        {
            let mut table = self.table.write().await;
            table.transition(&self.release, outcome.state())?;
            match &outcome {
                ReleaseOutcome::Failed(report) => {
                    table.set_release_error(report.clone());
                }
                ReleaseOutcome::Cancelled => {
                    table.set_release_error(cancelled_by_user(&self.release));
                }
                ReleaseOutcome::Completed => {}
            }
        }

        match &outcome {
            ReleaseOutcome::Failed(report) => {
                warn!(release = %self.release, error = %report, "release failed")
            }
            ReleaseOutcome::Cancelled => info!(release = %self.release, "release cancelled"),
            ReleaseOutcome::Completed => info!(release = %self.release, "release completed"),
        }
        Ok(outcome)
    }

    async fn deploy_wave(&self, wave: &EntityId) -> EngineResult<Outcome> {
        self.set(wave, EntityState::Deploying).await?;
        let clusters = self.tree.clusters_of(wave);
        info!(release = %self.release, entity = %wave, clusters = clusters.len(), "wave deploying");

        // Every cluster runs to its own end before the wave settles.
        let deployments: Vec<_> = clusters.iter().map(|c| self.deploy_cluster(c)).collect();
        let outcomes = try_join_all(deployments).await?;
        let outcome = Outcome::merge(outcomes);

        self.set(wave, outcome.state()).await?;
        info!(release = %self.release, entity = %wave, state = %outcome.state(), "wave finished");
        Ok(outcome)
    }

    async fn deploy_cluster(&self, cluster: &EntityId) -> EngineResult<Outcome> {
        self.set(cluster, EntityState::Deploying).await?;
        debug!(release = %self.release, entity = %cluster, "cluster deploying");

        let outcome = match self.tree.bundle_of(cluster) {
            Some(bundle) => self.deploy_bundle(bundle).await?,
            None => Outcome::Completed,
        };

        self.set(cluster, outcome.state()).await?;
        debug!(release = %self.release, entity = %cluster, state = %outcome.state(), "cluster finished");
        Ok(outcome)
    }

    async fn deploy_bundle(&self, bundle: &EntityId) -> EngineResult<Outcome> {
        self.set(bundle, EntityState::Deploying).await?;
        let apps = self.tree.apps_of(bundle);
        debug!(release = %self.release, entity = %bundle, apps = apps.len(), "bundle deploying");

        let mut outcome = Outcome::Completed;
        for (i, app) in apps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.cancel_apps(&apps[i..]).await?;
                outcome = Outcome::Cancelled;
                break;
            }
            if self.deploy_app(app).await? == Outcome::Failed {
                // Apps after the failed one are never attempted and stay pending.
                outcome = Outcome::Failed;
                break;
            }
        }

        self.set(bundle, outcome.state()).await?;
        debug!(release = %self.release, entity = %bundle, state = %outcome.state(), "bundle finished");
        Ok(outcome)
    }

    async fn deploy_app(&self, app: &EntityId) -> EngineResult<Outcome> {
        self.set(app, EntityState::Deploying).await?;
        debug!(release = %self.release, entity = %app, "app deploying");

        let token = ResumeToken {
            entity: app.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        };
        self.suspender
            .sleep(SleepRequest {
                token,
                duration: self.settings.deploy_duration,
                deadline: self.settings.timeout,
            })
            .await?;

        if self.settings.failure_scenario.targets(app) {
            self.set(app, EntityState::Failed).await?;
            let report = app_failure(app);
            warn!(release = %self.release, entity = %app, error = %report, "app deployment failed");
            self.failure.record(report);
            return Ok(Outcome::Failed);
        }

        self.set(app, EntityState::Completed).await?;
        debug!(release = %self.release, entity = %app, "app completed");
        Ok(Outcome::Completed)
    }

    /// Cancel a run of not-yet-started apps in one step.
    async fn cancel_apps(&self, apps: &[EntityId]) -> EngineResult<()> {
        self.cancel_processed.store(true, Ordering::SeqCst);
        let mut table = self.table.write().await;
        for app in apps {
            table.transition(app, EntityState::Cancelled)?;
        }
        warn!(release = %self.release, skipped = apps.len(), "apps cancelled before start");
        Ok(())
    }

    /// Cancel the given waves and everything under them in one step.
    async fn cancel_waves(&self, waves: &[EntityId]) -> EngineResult<()> {
        self.cancel_processed.store(true, Ordering::SeqCst);
        let mut table = self.table.write().await;
        let mut cancelled = 0;
        for wave in waves {
            cancelled += table.cancel_pending_subtree(wave)?;
        }
        warn!(
            release = %self.release,
            waves = waves.len(),
            entities = cancelled,
            "remaining waves cancelled"
        );
        Ok(())
    }

    async fn set(&self, id: &EntityId, state: EntityState) -> EngineResult<()> {
        self.table.write().await.transition(id, state)?;
        Ok(())
    }
}

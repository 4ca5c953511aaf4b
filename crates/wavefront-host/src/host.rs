//! Host runtime — owns every running release instance.
//!
//! Each `start` spawns one background task that drives an [`Engine`] to
//! its end. The registry keeps, per instance, the task handle, a read
//! gateway onto its table, its cancellation controller and a watch of its
//! host status.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wavefront_engine::{
    CancellationController, Engine, QueryGateway, ReleasePlan, Snapshot, TokioSuspender,
};

use crate::error::{HostError, HostResult};
use crate::status::{HostStatus, ReleaseView};

/// Handle for one release instance: its release ID.
pub type InstanceHandle = String;

/// Per-instance registry entry.
struct InstanceSlot {
    task: JoinHandle<()>,
    gateway: QueryGateway,
    controller: CancellationController,
    status: Arc<watch::Sender<HostStatus>>,
}

impl InstanceSlot {
    fn status(&self) -> HostStatus {
        *self.status.borrow()
    }

    /// Move a running instance to a host-side ending and stop its task.
    /// Returns `false` if the instance had already ended.
    fn stop(&self, next: HostStatus) -> bool {
        let changed = settle(&self.status, next);
        if changed {
            self.task.abort();
        }
        changed
    }
}

/// Set the status once; later endings are ignored.
fn settle(status: &watch::Sender<HostStatus>, next: HostStatus) -> bool {
    status.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = next;
            true
        }
    })
}

/// In-process host. Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct Host {
    instances: Arc<RwLock<HashMap<InstanceHandle, InstanceSlot>>>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the plan and start a new instance.
    ///
    /// A handle whose previous instance has ended may be started again.
    pub async fn start(&self, plan: &ReleasePlan) -> HostResult<InstanceHandle> {
        let engine = Engine::new(plan, Arc::new(TokioSuspender::new()))?;
        let handle = engine.release_id().to_string();

        let mut instances = self.instances.write().await;
        if instances
            .get(&handle)
            .is_some_and(|slot| !slot.status().is_terminal())
        {
            return Err(HostError::AlreadyRunning(handle));
        }

        let gateway = engine.gateway();
        let controller = engine.canceller();
        let (status, _) = watch::channel(HostStatus::Running);
        let status = Arc::new(status);

        let task_status = status.clone();
        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            let result = engine.run().await;
            let next = HostStatus::from_run(&result);
            match &result {
                Ok(outcome) => {
                    info!(instance = %task_handle, state = %outcome.state(), "instance finished")
                }
                Err(e) => warn!(instance = %task_handle, error = %e, "instance interrupted"),
            }
            settle(&task_status, next);
        });

        instances.insert(
            handle.clone(),
            InstanceSlot {
                task,
                gateway,
                controller,
                status,
            },
        );

        info!(
            instance = %handle,
            waves = plan.num_waves,
            clusters_per_wave = plan.clusters_per_wave,
            apps_per_bundle = plan.apps_per_bundle,
            scenario = %plan.failure_scenario,
            "instance started"
        );
        Ok(handle)
    }

    /// Signal cancellation. Returns `true` only for the first signal.
    pub async fn cancel(&self, handle: &str) -> HostResult<bool> {
        let instances = self.instances.read().await;
        let slot = instances
            .get(handle)
            .ok_or_else(|| HostError::NotFound(handle.to_string()))?;
        let first = slot.controller.signal();
        if first {
            info!(instance = %handle, "cancellation signalled");
        } else {
            debug!(instance = %handle, "cancellation already signalled");
        }
        Ok(first)
    }

    /// Run a query against the instance's tree.
    pub async fn query(&self, handle: &str, target: &str) -> HostResult<Snapshot> {
        let gateway = self.gateway(handle).await?;
        Ok(gateway.query_str(target).await?)
    }

    /// Read handle onto the instance's tree.
    pub async fn gateway(&self, handle: &str) -> HostResult<QueryGateway> {
        let instances = self.instances.read().await;
        instances
            .get(handle)
            .map(|slot| slot.gateway.clone())
            .ok_or_else(|| HostError::NotFound(handle.to_string()))
    }

    pub async fn execution_status(&self, handle: &str) -> HostResult<HostStatus> {
        let instances = self.instances.read().await;
        instances
            .get(handle)
            .map(InstanceSlot::status)
            .ok_or_else(|| HostError::NotFound(handle.to_string()))
    }

    /// Destroy a running instance. Its tree stays as it last was.
    pub async fn terminate(&self, handle: &str, reason: &str) -> HostResult<bool> {
        let instances = self.instances.read().await;
        let slot = instances
            .get(handle)
            .ok_or_else(|| HostError::NotFound(handle.to_string()))?;
        let stopped = slot.stop(HostStatus::Terminated);
        if stopped {
            warn!(instance = %handle, %reason, "instance terminated");
        }
        Ok(stopped)
    }

    /// Handles starting with `prefix`, sorted.
    pub async fn list_instances(&self, prefix: &str) -> Vec<InstanceHandle> {
        let instances = self.instances.read().await;
        let mut handles: Vec<_> = instances
            .keys()
            .filter(|h| h.starts_with(prefix))
            .cloned()
            .collect();
        handles.sort();
        handles
    }

    /// The release node with host status and effective state.
    pub async fn describe(&self, handle: &str) -> HostResult<ReleaseView> {
        let (gateway, status) = {
            let instances = self.instances.read().await;
            let slot = instances
                .get(handle)
                .ok_or_else(|| HostError::NotFound(handle.to_string()))?;
            (slot.gateway.clone(), slot.status())
        };
        Ok(ReleaseView::new(gateway.release().await, status))
    }

    /// Wait for the instance to end and return its final status.
    pub async fn wait(&self, handle: &str) -> HostResult<HostStatus> {
        let mut rx = {
            let instances = self.instances.read().await;
            instances
                .get(handle)
                .map(|slot| slot.status.subscribe())
                .ok_or_else(|| HostError::NotFound(handle.to_string()))?
        };
        let status = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| HostError::NotFound(handle.to_string()))?;
        Ok(*status)
    }

    /// Stop every running instance (graceful host stop).
    pub async fn shutdown(&self) {
        let instances = self.instances.read().await;
        let mut stopped = 0;
        for (handle, slot) in instances.iter() {
            if slot.stop(HostStatus::Cancelled) {
                debug!(instance = %handle, "instance stopped by shutdown");
                stopped += 1;
            }
        }
        info!(stopped, "host shut down");
    }
}

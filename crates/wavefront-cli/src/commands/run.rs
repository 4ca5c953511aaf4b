use std::time::Duration;

use anyhow::bail;
use tracing::info;
use wavefront_host::Host;
use wavefront_state::{EntityState, HierarchySnapshot, ObservedState};

use super::{seconds, Format, RunArgs};
use crate::render;

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let plan = args.shape.resolve()?;
    let watch_every = seconds("--watch-secs", args.watch_secs)?.max(Duration::from_millis(100));
    let cancel_after = args
        .cancel_after_secs
        .map(|secs| seconds("--cancel-after-secs", secs))
        .transpose()?;

    let host = Host::new();
    let handle = host.start(&plan).await?;
    let gateway = host.gateway(&handle).await?;

    if let Some(delay) = cancel_after {
        let host = host.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(true) = host.cancel(&handle).await {
                info!(instance = %handle, after = ?delay, "cancellation requested");
            }
        });
    }

    let mut ticker = tokio::time::interval(watch_every);
    ticker.tick().await;
    let status = loop {
        tokio::select! {
            status = host.wait(&handle) => break status?,
            _ = ticker.tick() => log_progress(&handle, &gateway.hierarchy().await),
        }
    };

    let view = host.describe(&handle).await?;
    let tree = gateway.hierarchy().await;
    match args.format {
        Format::Json => {
            let out = serde_json::json!({ "view": view, "hierarchy": tree });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            print!("{}", render::tree(&tree));
            println!("host status: {status}, effective: {}", view.effective);
        }
    }

    if view.effective != ObservedState::Completed {
        bail!("release {handle} ended {}", view.effective);
    }
    Ok(())
}

fn log_progress(handle: &str, tree: &HierarchySnapshot) {
    let count = |state: EntityState| tree.apps().filter(|a| a.state == state).count();
    info!(
        instance = %handle,
        release = %tree.release.record.state,
        pending = count(EntityState::Pending),
        deploying = count(EntityState::Deploying),
        completed = count(EntityState::Completed),
        failed = count(EntityState::Failed),
        cancelled = count(EntityState::Cancelled),
        "progress"
    );
}

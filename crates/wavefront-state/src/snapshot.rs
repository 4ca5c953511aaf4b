//! Read-only views over an entity table.
//!
//! Snapshots are owned copies, so a caller can hold one as long as it
//! likes without blocking the engine.

use serde::{Deserialize, Serialize};

use crate::types::{EntityRecord, FailureReport};

/// Current state of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(flatten)]
    pub record: EntityRecord,
    /// Outcome report; only ever set on the release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
}

/// The full release tree with every node's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    #[serde(flatten)]
    pub release: EntitySnapshot,
    pub waves: Vec<WaveNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveNode {
    #[serde(flatten)]
    pub wave: EntityRecord,
    pub clusters: Vec<ClusterNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    #[serde(flatten)]
    pub cluster: EntityRecord,
    pub bundle: Option<BundleNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleNode {
    #[serde(flatten)]
    pub bundle: EntityRecord,
    pub apps: Vec<EntityRecord>,
}

/// Flat listing of every node, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityListing {
    pub release: EntitySnapshot,
    pub waves: Vec<EntityRecord>,
    pub clusters: Vec<EntityRecord>,
    pub bundles: Vec<EntityRecord>,
    pub apps: Vec<EntityRecord>,
}

impl HierarchySnapshot {
    /// Every app record in declared order.
    pub fn apps(&self) -> impl Iterator<Item = &EntityRecord> {
        self.waves
            .iter()
            .flat_map(|w| w.clusters.iter())
            .filter_map(|c| c.bundle.as_ref())
            .flat_map(|b| b.apps.iter())
    }

    /// Every record in the tree, parents before children.
    pub fn records(&self) -> Vec<&EntityRecord> {
        let mut out = vec![&self.release.record];
        for wave in &self.waves {
            out.push(&wave.wave);
            for cluster in &wave.clusters {
                out.push(&cluster.cluster);
                if let Some(bundle) = &cluster.bundle {
                    out.push(&bundle.bundle);
                    out.extend(bundle.apps.iter());
                }
            }
        }
        out
    }
}

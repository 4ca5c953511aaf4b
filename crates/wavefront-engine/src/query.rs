//! Query gateway — read-only access to a running instance's tree.
//!
//! The engine takes the write lock only for the instant of a state change
//! and never holds it across a suspension point, so a reader always sees
//! a state between two engine steps, never half of one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use wavefront_state::*;

use crate::error::QueryError;

/// The table shared between an engine and its readers.
pub type SharedTable = Arc<RwLock<EntityTable>>;

/// What a query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// The release node itself.
    Release,
    /// The whole tree.
    Hierarchy,
    /// One node by ID.
    Entity(EntityId),
}

impl FromStr for QueryTarget {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, QueryError> {
        match s {
            "release" => Ok(QueryTarget::Release),
            "hierarchy" => Ok(QueryTarget::Hierarchy),
            _ => EntityId::parse(s)
                .map(QueryTarget::Entity)
                .map_err(QueryError::InvalidTarget),
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Release => f.write_str("release"),
            QueryTarget::Hierarchy => f.write_str("hierarchy"),
            QueryTarget::Entity(id) => write!(f, "{id}"),
        }
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Hierarchy(HierarchySnapshot),
    Entity(EntitySnapshot),
}

/// Cheap, cloneable read handle over one instance's table.
#[derive(Clone)]
pub struct QueryGateway {
    table: SharedTable,
}

impl QueryGateway {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }

    /// Current state of one node of this instance's tree.
    pub async fn entity_state(&self, id: &EntityId) -> Result<EntitySnapshot, QueryError> {
        let table = self.table.read().await;
        table
            .snapshot(id)
            .map_err(|_| QueryError::NotFound(id.clone()))
    }

    pub async fn release(&self) -> EntitySnapshot {
        self.table.read().await.release_snapshot()
    }

    pub async fn hierarchy(&self) -> HierarchySnapshot {
        self.table.read().await.hierarchy()
    }

    pub async fn list_entities(&self) -> EntityListing {
        self.table.read().await.listing()
    }

    /// Every transition accepted so far.
    pub async fn transitions(&self) -> Vec<Transition> {
        self.table.read().await.transitions().to_vec()
    }

    pub async fn query(&self, target: &QueryTarget) -> Result<Snapshot, QueryError> {
        match target {
            QueryTarget::Release => Ok(Snapshot::Entity(self.release().await)),
            QueryTarget::Hierarchy => Ok(Snapshot::Hierarchy(self.hierarchy().await)),
            QueryTarget::Entity(id) => self.entity_state(id).await.map(Snapshot::Entity),
        }
    }

    /// Parse `target` and run the query.
    pub async fn query_str(&self, target: &str) -> Result<Snapshot, QueryError> {
        self.query(&target.parse()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan, ReleasePlan};

    fn gateway() -> QueryGateway {
        let tree = plan(&ReleasePlan {
            num_waves: 1,
            clusters_per_wave: 1,
            apps_per_bundle: 2,
            ..ReleasePlan::new("release:q")
        })
        .unwrap();
        QueryGateway::new(Arc::new(RwLock::new(tree.to_table().unwrap())))
    }

    #[test]
    fn parses_targets() {
        assert_eq!("release".parse::<QueryTarget>().unwrap(), QueryTarget::Release);
        assert_eq!("hierarchy".parse::<QueryTarget>().unwrap(), QueryTarget::Hierarchy);
        assert!(matches!(
            "wave:wave-1".parse::<QueryTarget>().unwrap(),
            QueryTarget::Entity(_)
        ));
        assert!(matches!(
            "wave:".parse::<QueryTarget>(),
            Err(QueryError::InvalidTarget(_))
        ));
        assert!(matches!(
            "everything".parse::<QueryTarget>(),
            Err(QueryError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn entity_lookup_and_not_found() {
        let gw = gateway();
        let app = EntityId::parse("app:cluster-1-1-bundle-app-2").unwrap();
        let snap = gw.entity_state(&app).await.unwrap();
        assert_eq!(snap.record.state, EntityState::Pending);

        let foreign = EntityId::parse("app:cluster-9-9-bundle-app-9").unwrap();
        assert_eq!(
            gw.entity_state(&foreign).await.unwrap_err(),
            QueryError::NotFound(foreign)
        );
    }

    #[tokio::test]
    async fn query_dispatches_by_target() {
        let gw = gateway();
        match gw.query_str("release").await.unwrap() {
            Snapshot::Entity(s) => assert_eq!(s.record.id.as_str(), "release:q"),
            other => panic!("expected release snapshot, got {other:?}"),
        }
        match gw.query_str("hierarchy").await.unwrap() {
            Snapshot::Hierarchy(h) => assert_eq!(h.apps().count(), 2),
            other => panic!("expected hierarchy, got {other:?}"),
        }
        assert!(gw.query_str("bundle:cluster-1-1-bundle").await.is_ok());
    }

    #[tokio::test]
    async fn queries_never_mutate() {
        let gw = gateway();
        let before = gw.hierarchy().await;
        for _ in 0..100 {
            let _ = gw.query_str("hierarchy").await;
            let _ = gw.list_entities().await;
        }
        assert_eq!(gw.hierarchy().await, before);
        assert!(gw.transitions().await.is_empty());
    }
}

//! EntityTable — the per-instance mapping from entity ID to state.
//!
//! One table is owned by exactly one release instance. It is loaded once
//! from the planner's output and afterwards only changes through
//! [`EntityTable::transition`], which enforces the forward-only lifecycle
//! and stamps each change with the table's logical clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{StateError, StateResult};
use crate::id::{EntityId, EntityKind};
use crate::snapshot::*;
use crate::types::*;

/// One accepted state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub entity: EntityId,
    pub from: EntityState,
    pub to: EntityState,
    pub at: Timestamp,
}

/// State of every node in one release tree.
#[derive(Debug)]
pub struct EntityTable {
    release_id: EntityId,
    records: HashMap<EntityId, EntityRecord>,
    /// Declared order, parents before children.
    order: Vec<EntityId>,
    release_error: Option<FailureReport>,
    clock: LogicalClock,
    log: Vec<Transition>,
}

impl EntityTable {
    /// Build a table from a complete set of records.
    ///
    /// Exactly one record must be a release; every parent and child
    /// reference must resolve inside the set.
    pub fn load(records: Vec<EntityRecord>) -> StateResult<Self> {
        let mut releases = records.iter().filter(|r| r.id.kind() == EntityKind::Release);
        let release_id = match (releases.next(), releases.next()) {
            (Some(r), None) => r.id.clone(),
            (None, _) => return Err(StateError::NotFound("release record".to_string())),
            (Some(_), Some(second)) => return Err(StateError::Duplicate(second.id.to_string())),
        };

        let mut map = HashMap::with_capacity(records.len());
        let mut order = Vec::with_capacity(records.len());
        let mut latest = Timestamp(0);
        for record in records {
            latest = latest.max(record.updated_at);
            order.push(record.id.clone());
            if let Some(dup) = map.insert(record.id.clone(), record) {
                return Err(StateError::Duplicate(dup.id.to_string()));
            }
        }

        for record in map.values() {
            let refs = record.parent.iter().chain(record.children.iter());
            if let Some(missing) = refs.into_iter().find(|id| !map.contains_key(*id)) {
                return Err(StateError::NotFound(missing.to_string()));
            }
        }

        let clock = LogicalClock::new();
        while clock.now() < latest {
            clock.tick();
        }

        Ok(Self {
            release_id,
            records: map,
            order,
            release_error: None,
            clock,
            log: Vec::new(),
        })
    }

    pub fn release_id(&self) -> &EntityId {
        &self.release_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> StateResult<&EntityRecord> {
        self.records
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    pub fn state(&self, id: &EntityId) -> StateResult<EntityState> {
        self.get(id).map(|r| r.state)
    }

    /// Child IDs of a node in declared order.
    pub fn children(&self, id: &EntityId) -> StateResult<&[EntityId]> {
        self.get(id).map(|r| r.children.as_slice())
    }

    /// All records of one kind in declared order.
    pub fn iter_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRecord> {
        self.order
            .iter()
            .filter(move |id| id.kind() == kind)
            .filter_map(|id| self.records.get(id))
    }

    /// Apply a forward state change.
    ///
    /// Returns `Ok(false)` without touching anything when the entity is
    /// already terminal: a latched outcome is never overwritten.
    pub fn transition(&mut self, id: &EntityId, next: EntityState) -> StateResult<bool> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        let from = record.state;
        if from.is_terminal() {
            trace!(entity = %id, %from, to = %next, "transition ignored, outcome latched");
            return Ok(false);
        }
        if !from.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                id: id.to_string(),
                from,
                to: next,
            });
        }
        let at = self.clock.tick();
        record.state = next;
        record.updated_at = at;
        self.log.push(Transition {
            entity: id.clone(),
            from,
            to: next,
            at,
        });
        trace!(entity = %id, %from, to = %next, %at, "transition");
        Ok(true)
    }

    /// Move every still-`pending` node of the subtree rooted at `id`
    /// (root included) to `cancelled`. Returns how many changed.
    pub fn cancel_pending_subtree(&mut self, id: &EntityId) -> StateResult<usize> {
        let mut stack = vec![id.clone()];
        let mut changed = 0;
        while let Some(next) = stack.pop() {
            let record = self.get(&next)?;
            stack.extend(record.children.iter().rev().cloned());
            let pending = record.state == EntityState::Pending;
            if pending && self.transition(&next, EntityState::Cancelled)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Store the release outcome report. First write wins.
    pub fn set_release_error(&mut self, report: FailureReport) -> bool {
        if self.release_error.is_some() {
            return false;
        }
        self.release_error = Some(report);
        let release_id = self.release_id.clone();
        self.touch(&release_id);
        true
    }

    pub fn release_error(&self) -> Option<&FailureReport> {
        self.release_error.as_ref()
    }

    /// Every accepted transition, in order.
    pub fn transitions(&self) -> &[Transition] {
        &self.log
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn touch(&mut self, id: &EntityId) {
        let at = self.clock.tick();
        if let Some(record) = self.records.get_mut(id) {
            record.updated_at = at;
        }
    }

    // ── Snapshots ──────────────────────────────────────────────────

    pub fn snapshot(&self, id: &EntityId) -> StateResult<EntitySnapshot> {
        let record = self.get(id)?.clone();
        let error = if *id == self.release_id {
            self.release_error.clone()
        } else {
            None
        };
        Ok(EntitySnapshot { record, error })
    }

    pub fn hierarchy(&self) -> HierarchySnapshot {
        let waves = self
            .child_records(&self.release_id)
            .map(|wave| WaveNode {
                clusters: self
                    .child_records(&wave.id)
                    .map(|cluster| ClusterNode {
                        bundle: self.child_records(&cluster.id).next().map(|bundle| BundleNode {
                            apps: self.child_records(&bundle.id).cloned().collect(),
                            bundle: bundle.clone(),
                        }),
                        cluster: cluster.clone(),
                    })
                    .collect(),
                wave: wave.clone(),
            })
            .collect();

        HierarchySnapshot {
            release: self.release_snapshot(),
            waves,
        }
    }

    pub fn listing(&self) -> EntityListing {
        let collect = |kind| self.iter_kind(kind).cloned().collect::<Vec<_>>();
        EntityListing {
            release: self.release_snapshot(),
            waves: collect(EntityKind::Wave),
            clusters: collect(EntityKind::Cluster),
            bundles: collect(EntityKind::Bundle),
            apps: collect(EntityKind::App),
        }
    }

    pub fn release_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            record: self.records[&self.release_id].clone(),
            error: self.release_error.clone(),
        }
    }

    fn child_records<'a>(&'a self, id: &EntityId) -> impl Iterator<Item = &'a EntityRecord> + 'a {
        self.records
            .get(id)
            .map(|r| r.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.records.get(child))
    }
}

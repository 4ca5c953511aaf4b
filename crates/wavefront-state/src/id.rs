//! Entity identifiers.
//!
//! Every node in a release tree is addressed by `{kind}:{identifier}`.
//! The format is enforced at every boundary that accepts an ID from the
//! outside; planner-generated IDs go through the same parser.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Maximum accepted length of a full `{kind}:{identifier}` string.
pub const MAX_ID_LEN: usize = 200;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(release|wave|cluster|bundle|app):[A-Za-z0-9_-]+$")
        .unwrap_or_else(|e| panic!("entity id pattern must compile: {e}"))
});

/// The five levels of a release tree, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Release,
    Wave,
    Cluster,
    Bundle,
    App,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Release,
        EntityKind::Wave,
        EntityKind::Cluster,
        EntityKind::Bundle,
        EntityKind::App,
    ];

    /// The ID prefix for this kind (without the colon).
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Release => "release",
            EntityKind::Wave => "wave",
            EntityKind::Cluster => "cluster",
            EntityKind::Bundle => "bundle",
            EntityKind::App => "app",
        }
    }

    /// The kind one level below, or `None` for apps.
    pub fn child(self) -> Option<EntityKind> {
        match self {
            EntityKind::Release => Some(EntityKind::Wave),
            EntityKind::Wave => Some(EntityKind::Cluster),
            EntityKind::Cluster => Some(EntityKind::Bundle),
            EntityKind::Bundle => Some(EntityKind::App),
            EntityKind::App => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for EntityKind {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.prefix() == s)
            .ok_or_else(|| StateError::InvalidId {
                id: s.to_string(),
                reason: "unknown entity kind".to_string(),
            })
    }
}

/// A validated, immutable `{kind}:{identifier}` entity ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    raw: String,
    kind: EntityKind,
}

impl EntityId {
    /// Parse and validate an ID string.
    pub fn parse(raw: &str) -> StateResult<Self> {
        if raw.len() > MAX_ID_LEN {
            return Err(StateError::InvalidId {
                id: raw.chars().take(32).collect(),
                reason: format!("longer than {MAX_ID_LEN} characters"),
            });
        }
        if !ID_PATTERN.is_match(raw) {
            return Err(StateError::InvalidId {
                id: raw.to_string(),
                reason: "expected {kind}:{identifier} with identifier in [A-Za-z0-9_-]".to_string(),
            });
        }
        // Pattern match guarantees a known prefix before the first colon.
        let (prefix, _) = raw.split_once(':').ok_or_else(|| StateError::InvalidId {
            id: raw.to_string(),
            reason: "missing ':' separator".to_string(),
        })?;
        let kind = prefix.parse()?;
        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }

    /// Parse an ID and require a specific kind.
    pub fn parse_kind(raw: &str, expected: EntityKind) -> StateResult<Self> {
        let id = Self::parse(raw)?;
        if id.kind != expected {
            return Err(StateError::InvalidId {
                id: raw.to_string(),
                reason: format!("expected a {expected} id, got a {} id", id.kind),
            });
        }
        Ok(id)
    }

    /// Build an ID from a kind and a bare identifier.
    pub fn new(kind: EntityKind, identifier: &str) -> StateResult<Self> {
        Self::parse(&format!("{}:{identifier}", kind.prefix()))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The part after `{kind}:`.
    pub fn identifier(&self) -> &str {
        &self.raw[self.kind.prefix().len() + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EntityId {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = StateError;

    fn try_from(value: String) -> StateResult<Self> {
        Self::parse(&value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.raw
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind() {
        for kind in EntityKind::ALL {
            let id = EntityId::new(kind, "abc-1_2").unwrap();
            assert_eq!(id.kind(), kind);
            assert_eq!(id.identifier(), "abc-1_2");
            assert_eq!(id.as_str(), format!("{}:abc-1_2", kind.prefix()));
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in [
            "",
            "release",
            "release:",
            "rollout:abc",
            "release:abc; DROP TABLE",
            "release:a b",
            "wave:wave:1",
            "Release:abc",
        ] {
            assert!(
                matches!(EntityId::parse(raw), Err(StateError::InvalidId { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_ids() {
        let raw = format!("release:{}", "a".repeat(MAX_ID_LEN));
        assert!(EntityId::parse(&raw).is_err());

        let ok = format!("release:{}", "a".repeat(MAX_ID_LEN - "release:".len()));
        assert!(EntityId::parse(&ok).is_ok());
    }

    #[test]
    fn parse_kind_enforces_expected_kind() {
        assert!(EntityId::parse_kind("release:r1", EntityKind::Release).is_ok());
        let err = EntityId::parse_kind("wave:wave-1", EntityKind::Release).unwrap_err();
        assert!(err.to_string().contains("expected a release id"));
    }

    #[test]
    fn serde_uses_plain_string_and_validates() {
        let id = EntityId::parse("app:cluster-1-1-bundle-app-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"app:cluster-1-1-bundle-app-1\"");

        let bad: Result<EntityId, _> = serde_json::from_str("\"app:../etc\"");
        assert!(bad.is_err());
    }

    #[test]
    fn kind_hierarchy_descends_to_app() {
        let mut kind = EntityKind::Release;
        let mut depth = 1;
        while let Some(next) = kind.child() {
            kind = next;
            depth += 1;
        }
        assert_eq!(kind, EntityKind::App);
        assert_eq!(depth, 5);
    }
}

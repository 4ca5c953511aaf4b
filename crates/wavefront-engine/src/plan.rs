//! Hierarchy planner — release shape, failure scenarios, and the static tree.
//!
//! [`plan`] is a pure function of its input: the same [`ReleasePlan`]
//! always yields the same IDs in the same order, every node `pending`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wavefront_state::{EntityId, EntityKind, EntityRecord, EntityTable, StateResult, Timestamp};

use crate::error::{PlanError, PlanResult};

/// Upper bound for each of the three tree-shape counts.
pub const MAX_COUNT: u32 = 100;

/// Upper bound for a single simulated app deployment.
pub const MAX_APP_DURATION: Duration = Duration::from_secs(3600);

/// Which apps, if any, fail after their simulated deployment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FailureScenario {
    #[default]
    None,
    AppFailure(AppTarget),
}

/// Selects the app(s) a failure scenario applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppTarget {
    /// One specific app.
    Exact(EntityId),
    /// Every app whose identifier ends with `-{suffix}`, e.g. `app-2`.
    Suffix(String),
}

impl AppTarget {
    pub fn matches(&self, app: &EntityId) -> bool {
        match self {
            AppTarget::Exact(id) => id == app,
            AppTarget::Suffix(suffix) => app
                .identifier()
                .strip_suffix(suffix.as_str())
                .is_some_and(|rest| rest.ends_with('-')),
        }
    }
}

impl FailureScenario {
    /// The classic scenario: the second app of every bundle fails.
    pub fn second_app() -> Self {
        FailureScenario::AppFailure(AppTarget::Suffix("app-2".to_string()))
    }

    pub fn targets(&self, app: &EntityId) -> bool {
        match self {
            FailureScenario::None => false,
            FailureScenario::AppFailure(target) => target.matches(app),
        }
    }
}

impl FromStr for FailureScenario {
    type Err = PlanError;

    /// Accepted forms: `none`, `app_failure`, `app_failure:{suffix}`,
    /// and a full app ID such as `app:cluster-1-1-bundle-app-3`.
    fn from_str(s: &str) -> PlanResult<Self> {
        match s {
            "" | "none" => Ok(FailureScenario::None),
            "app_failure" => Ok(FailureScenario::second_app()),
            _ => {
                if let Some(suffix) = s.strip_prefix("app_failure:") {
                    let valid = !suffix.is_empty()
                        && suffix
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                    if !valid {
                        return Err(PlanError::InvalidScenario(s.to_string()));
                    }
                    return Ok(FailureScenario::AppFailure(AppTarget::Suffix(
                        suffix.to_string(),
                    )));
                }
                let id = EntityId::parse_kind(s, EntityKind::App)
                    .map_err(|_| PlanError::InvalidScenario(s.to_string()))?;
                Ok(FailureScenario::AppFailure(AppTarget::Exact(id)))
            }
        }
    }
}

impl fmt::Display for FailureScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureScenario::None => f.write_str("none"),
            FailureScenario::AppFailure(AppTarget::Suffix(s)) if s == "app-2" => {
                f.write_str("app_failure")
            }
            FailureScenario::AppFailure(AppTarget::Suffix(s)) => write!(f, "app_failure:{s}"),
            FailureScenario::AppFailure(AppTarget::Exact(id)) => write!(f, "{id}"),
        }
    }
}

impl TryFrom<String> for FailureScenario {
    type Error = PlanError;

    fn try_from(value: String) -> PlanResult<Self> {
        value.parse()
    }
}

impl From<FailureScenario> for String {
    fn from(s: FailureScenario) -> Self {
        s.to_string()
    }
}

/// Input to the planner: the shape and behavior of one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasePlan {
    /// Release ID in `release:{identifier}` form.
    pub release_id: String,
    pub num_waves: u32,
    pub clusters_per_wave: u32,
    pub apps_per_bundle: u32,
    /// Simulated time spent deploying each app.
    #[serde(rename = "app_deploy_secs", with = "secs")]
    pub app_deploy_duration: Duration,
    pub failure_scenario: FailureScenario,
    /// Hard limit on a single app deployment, enforced by the host.
    #[serde(
        rename = "app_timeout_secs",
        with = "opt_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_timeout: Option<Duration>,
}

impl Default for ReleasePlan {
    fn default() -> Self {
        Self {
            release_id: "release:default".to_string(),
            num_waves: 2,
            clusters_per_wave: 2,
            apps_per_bundle: 3,
            app_deploy_duration: Duration::from_secs(4),
            failure_scenario: FailureScenario::None,
            app_timeout: None,
        }
    }
}

/// On-disk plan file: a single `[release]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanFile {
    release: ReleasePlan,
}

impl ReleasePlan {
    pub fn new(release_id: &str) -> Self {
        Self {
            release_id: release_id.to_string(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> PlanResult<Self> {
        let file: PlanFile = toml::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))?;
        Ok(file.release)
    }

    pub fn from_file(path: &Path) -> PlanResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> PlanResult<String> {
        toml::to_string_pretty(&PlanFile {
            release: self.clone(),
        })
        .map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// Check every input without building anything.
    pub fn validate(&self) -> PlanResult<EntityId> {
        let release = EntityId::parse_kind(&self.release_id, EntityKind::Release)
            .map_err(PlanError::InvalidReleaseId)?;
        for (field, value) in [
            ("num_waves", self.num_waves),
            ("clusters_per_wave", self.clusters_per_wave),
            ("apps_per_bundle", self.apps_per_bundle),
        ] {
            if !(1..=MAX_COUNT).contains(&value) {
                return Err(PlanError::CountOutOfRange { field, value });
            }
        }
        if self.app_deploy_duration > MAX_APP_DURATION {
            return Err(PlanError::DurationTooLong(self.app_deploy_duration));
        }
        if self.app_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PlanError::ZeroTimeout);
        }
        Ok(release)
    }
}

/// The static release tree produced by [`plan`].
#[derive(Debug, Clone)]
pub struct ReleaseTree {
    release: EntityId,
    records: Vec<EntityRecord>,
    index: HashMap<EntityId, usize>,
}

impl ReleaseTree {
    pub fn release_id(&self) -> &EntityId {
        &self.release
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Child IDs of a node; empty for apps and unknown IDs.
    pub fn children(&self, id: &EntityId) -> &[EntityId] {
        self.get(id).map(|r| r.children.as_slice()).unwrap_or_default()
    }

    pub fn waves(&self) -> &[EntityId] {
        self.children(&self.release)
    }

    pub fn clusters_of(&self, wave: &EntityId) -> &[EntityId] {
        self.children(wave)
    }

    /// A cluster's single bundle.
    pub fn bundle_of(&self, cluster: &EntityId) -> Option<&EntityId> {
        self.children(cluster).first()
    }

    pub fn apps_of(&self, bundle: &EntityId) -> &[EntityId] {
        self.children(bundle)
    }

    /// Load the tree into a fresh entity table.
    pub fn to_table(&self) -> StateResult<EntityTable> {
        EntityTable::load(self.records.clone())
    }
}

/// Generate the complete, all-`pending` tree for a release.
pub fn plan(input: &ReleasePlan) -> PlanResult<ReleaseTree> {
    let release = input.validate()?;
    let at = Timestamp(1);
    let mut records = Vec::new();

    let mut release_record = EntityRecord::pending(release.clone(), release.identifier(), None, at);

    for w in 1..=input.num_waves {
        let wave_id = EntityId::new(EntityKind::Wave, &format!("wave-{w}"))?;
        let mut wave = EntityRecord::pending(
            wave_id.clone(),
            format!("Wave {w}"),
            Some(release.clone()),
            at,
        );
        wave.sequence = Some(w);

        let mut wave_descendants = Vec::new();
        for c in 1..=input.clusters_per_wave {
            let cluster_key = format!("cluster-{w}-{c}");
            let cluster_name = format!("Cluster {w}-{c}");
            let cluster_id = EntityId::new(EntityKind::Cluster, &cluster_key)?;
            let bundle_key = format!("{cluster_key}-bundle");
            let bundle_id = EntityId::new(EntityKind::Bundle, &bundle_key)?;

            let mut cluster = EntityRecord::pending(
                cluster_id.clone(),
                cluster_name.clone(),
                Some(wave_id.clone()),
                at,
            );
            cluster.children.push(bundle_id.clone());

            let mut bundle = EntityRecord::pending(
                bundle_id.clone(),
                format!("Bundle for {cluster_name}"),
                Some(cluster_id.clone()),
                at,
            );

            let mut apps = Vec::new();
            for a in 1..=input.apps_per_bundle {
                let app_id = EntityId::new(EntityKind::App, &format!("{bundle_key}-app-{a}"))?;
                let mut app = EntityRecord::pending(
                    app_id.clone(),
                    format!("App {a} - {cluster_name}"),
                    Some(bundle_id.clone()),
                    at,
                );
                app.version = Some(format!("v1.{a}.0"));
                bundle.children.push(app_id);
                apps.push(app);
            }

            wave.children.push(cluster_id);
            wave_descendants.push(cluster);
            wave_descendants.push(bundle);
            wave_descendants.extend(apps);
        }

        release_record.children.push(wave_id);
        records.push(wave);
        records.extend(wave_descendants);
    }

    records.insert(0, release_record);
    let index = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    Ok(ReleaseTree {
        release,
        records,
        index,
    })
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavefront_state::EntityState;

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    #[test]
    fn default_plan_shape() {
        let p = ReleasePlan::default();
        assert_eq!(p.num_waves, 2);
        assert_eq!(p.clusters_per_wave, 2);
        assert_eq!(p.apps_per_bundle, 3);
        assert_eq!(p.app_deploy_duration, Duration::from_secs(4));
        assert_eq!(p.failure_scenario, FailureScenario::None);
    }

    #[test]
    fn generates_expected_ids() {
        let tree = plan(&ReleasePlan {
            release_id: "release:rel-1".to_string(),
            num_waves: 2,
            clusters_per_wave: 2,
            apps_per_bundle: 3,
            ..Default::default()
        })
        .unwrap();

        // 1 release + 2 waves + 4 clusters + 4 bundles + 12 apps
        assert_eq!(tree.len(), 23);
        assert_eq!(tree.waves(), &[id("wave:wave-1"), id("wave:wave-2")]);

        let clusters = tree.clusters_of(&id("wave:wave-2"));
        assert_eq!(clusters, &[id("cluster:cluster-2-1"), id("cluster:cluster-2-2")]);

        let bundle = tree.bundle_of(&id("cluster:cluster-2-1")).unwrap();
        assert_eq!(bundle, &id("bundle:cluster-2-1-bundle"));

        let apps = tree.apps_of(bundle);
        assert_eq!(apps.len(), 3);
        assert_eq!(apps[2], id("app:cluster-2-1-bundle-app-3"));

        let app = tree.get(&apps[2]).unwrap();
        assert_eq!(app.name, "App 3 - Cluster 2-1");
        assert_eq!(app.version.as_deref(), Some("v1.3.0"));
        assert_eq!(app.parent.as_ref(), Some(bundle));
        assert_eq!(tree.get(&id("wave:wave-2")).unwrap().sequence, Some(2));
    }

    #[test]
    fn planning_is_deterministic() {
        let input = ReleasePlan::new("release:same");
        let a = plan(&input).unwrap();
        let b = plan(&input).unwrap();
        assert_eq!(a.records(), b.records());
    }

    #[test]
    fn every_entity_starts_pending() {
        let tree = plan(&ReleasePlan::new("release:r")).unwrap();
        assert!(tree.records().iter().all(|r| r.state == EntityState::Pending));
        assert!(tree.records().iter().all(|r| r.created_at == r.updated_at));
        assert_eq!(tree.records()[0].id, id("release:r"));
    }

    #[test]
    fn parents_precede_children() {
        let tree = plan(&ReleasePlan::new("release:r")).unwrap();
        let mut seen = std::collections::HashSet::new();
        for record in tree.records() {
            if let Some(parent) = &record.parent {
                assert!(seen.contains(parent), "{} before its parent", record.id);
            }
            seen.insert(record.id.clone());
        }
    }

    #[test]
    fn rejects_bad_release_id() {
        for bad in ["rel-1", "wave:wave-1", "release:bad id", "release:"] {
            let err = plan(&ReleasePlan::new(bad)).unwrap_err();
            assert!(matches!(err, PlanError::InvalidReleaseId(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_out_of_range_counts() {
        let err = plan(&ReleasePlan {
            num_waves: 0,
            ..ReleasePlan::new("release:r")
        })
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::CountOutOfRange {
                field: "num_waves",
                value: 0
            }
        ));

        let err = plan(&ReleasePlan {
            apps_per_bundle: MAX_COUNT + 1,
            ..ReleasePlan::new("release:r")
        })
        .unwrap_err();
        assert!(matches!(err, PlanError::CountOutOfRange { field: "apps_per_bundle", .. }));
    }

    #[test]
    fn rejects_excessive_duration_and_zero_timeout() {
        let err = ReleasePlan {
            app_deploy_duration: MAX_APP_DURATION + Duration::from_secs(1),
            ..ReleasePlan::new("release:r")
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, PlanError::DurationTooLong(_)));

        let err = ReleasePlan {
            app_timeout: Some(Duration::ZERO),
            ..ReleasePlan::new("release:r")
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, PlanError::ZeroTimeout));
    }

    #[test]
    fn suffix_target_does_not_match_longer_numbers() {
        let target = AppTarget::Suffix("app-2".to_string());
        assert!(target.matches(&id("app:cluster-1-1-bundle-app-2")));
        assert!(!target.matches(&id("app:cluster-1-1-bundle-app-12")));
        assert!(!target.matches(&id("app:cluster-1-1-bundle-app-20")));
        assert!(!target.matches(&id("app:app-2")));
    }

    #[test]
    fn scenario_string_forms() {
        assert_eq!("none".parse::<FailureScenario>().unwrap(), FailureScenario::None);
        assert_eq!(
            "app_failure".parse::<FailureScenario>().unwrap(),
            FailureScenario::second_app()
        );
        assert_eq!(
            "app_failure:app-3".parse::<FailureScenario>().unwrap(),
            FailureScenario::AppFailure(AppTarget::Suffix("app-3".to_string()))
        );
        let exact: FailureScenario = "app:cluster-1-2-bundle-app-1".parse().unwrap();
        assert!(exact.targets(&id("app:cluster-1-2-bundle-app-1")));
        assert!(!exact.targets(&id("app:cluster-1-1-bundle-app-1")));

        assert!("wave:wave-1".parse::<FailureScenario>().is_err());
        assert!("app_failure:".parse::<FailureScenario>().is_err());
        assert!("random_failure".parse::<FailureScenario>().is_err());

        assert_eq!(FailureScenario::second_app().to_string(), "app_failure");
    }

    #[test]
    fn parses_plan_file() {
        let toml_str = r#"
[release]
release_id = "release:from-file"
num_waves = 1
apps_per_bundle = 5
app_deploy_secs = 0.25
failure_scenario = "app_failure:app-4"
app_timeout_secs = 2
"#;
        let p = ReleasePlan::from_toml_str(toml_str).unwrap();
        assert_eq!(p.release_id, "release:from-file");
        assert_eq!(p.num_waves, 1);
        // Unset fields keep their defaults.
        assert_eq!(p.clusters_per_wave, 2);
        assert_eq!(p.apps_per_bundle, 5);
        assert_eq!(p.app_deploy_duration, Duration::from_millis(250));
        assert_eq!(p.app_timeout, Some(Duration::from_secs(2)));
        assert!(p.failure_scenario.targets(&id("app:cluster-1-1-bundle-app-4")));
    }

    #[test]
    fn plan_file_rejects_negative_duration() {
        let toml_str = r#"
[release]
release_id = "release:r"
app_deploy_secs = -1.0
"#;
        assert!(matches!(
            ReleasePlan::from_toml_str(toml_str),
            Err(PlanError::Parse(_))
        ));
    }

    #[test]
    fn plan_file_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release.toml");
        let original = ReleasePlan {
            failure_scenario: FailureScenario::second_app(),
            app_timeout: Some(Duration::from_secs(10)),
            ..ReleasePlan::new("release:disk")
        };
        std::fs::write(&path, original.to_toml_string().unwrap()).unwrap();

        let loaded = ReleasePlan::from_file(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn tree_loads_into_table() {
        let tree = plan(&ReleasePlan::new("release:r")).unwrap();
        let table = tree.to_table().unwrap();
        assert_eq!(table.len(), tree.len());
        assert_eq!(table.release_id(), tree.release_id());
    }
}

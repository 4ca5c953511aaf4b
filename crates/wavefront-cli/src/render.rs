//! Plain-text rendering of a release tree.

use std::fmt::Write;

use wavefront_state::{EntityRecord, HierarchySnapshot};

/// One line per node, indented by depth.
pub fn tree(snapshot: &HierarchySnapshot) -> String {
    let mut out = String::new();
    line(&mut out, 0, &snapshot.release.record);
    if let Some(error) = &snapshot.release.error {
        let _ = writeln!(out, "  ! {error}");
    }
    for wave in &snapshot.waves {
        line(&mut out, 1, &wave.wave);
        for cluster in &wave.clusters {
            line(&mut out, 2, &cluster.cluster);
            if let Some(bundle) = &cluster.bundle {
                line(&mut out, 3, &bundle.bundle);
                for app in &bundle.apps {
                    line(&mut out, 4, app);
                }
            }
        }
    }
    out
}

fn line(out: &mut String, depth: usize, record: &EntityRecord) {
    let indent = "  ".repeat(depth);
    let _ = match &record.version {
        Some(version) => writeln!(out, "{indent}{} {version} [{}]", record.id, record.state),
        None => writeln!(out, "{indent}{} [{}]", record.id, record.state),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavefront_engine::{plan, ReleasePlan};

    #[test]
    fn renders_every_node_indented() {
        let snapshot = plan(&ReleasePlan {
            num_waves: 1,
            clusters_per_wave: 1,
            apps_per_bundle: 2,
            ..ReleasePlan::new("release:r")
        })
        .unwrap()
        .to_table()
        .unwrap()
        .hierarchy();

        let text = tree(&snapshot);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "release:r [pending]",
                "  wave:wave-1 [pending]",
                "    cluster:cluster-1-1 [pending]",
                "      bundle:cluster-1-1-bundle [pending]",
                "        app:cluster-1-1-bundle-app-1 v1.1.0 [pending]",
                "        app:cluster-1-1-bundle-app-2 v1.2.0 [pending]",
            ]
        );
    }
}

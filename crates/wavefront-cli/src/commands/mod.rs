use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use wavefront_engine::ReleasePlan;

pub mod plan;
pub mod run;

/// Output format for the final tree.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

/// Release shape. Flags override values read from `--plan`.
#[derive(Args, Debug, Default)]
pub struct ShapeArgs {
    /// TOML plan file with a `[release]` table.
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Release ID, e.g. `release:checkout-v2`.
    #[arg(long)]
    pub release: Option<String>,

    /// Number of waves.
    #[arg(long)]
    pub waves: Option<u32>,

    /// Clusters per wave.
    #[arg(long)]
    pub clusters: Option<u32>,

    /// Apps per bundle.
    #[arg(long)]
    pub apps: Option<u32>,

    /// Simulated deploy time per app, in seconds.
    #[arg(long)]
    pub app_secs: Option<f64>,

    /// Failure scenario: none, app_failure, app_failure:<suffix> or an app ID.
    #[arg(long)]
    pub fail: Option<String>,

    /// Host-enforced limit per app deployment, in seconds.
    #[arg(long)]
    pub app_timeout_secs: Option<f64>,
}

impl ShapeArgs {
    /// Resolve the plan: file first (if any), then flag overrides.
    pub fn resolve(&self) -> anyhow::Result<ReleasePlan> {
        let mut plan = match &self.plan {
            Some(path) => ReleasePlan::from_file(path)
                .with_context(|| format!("loading plan {}", path.display()))?,
            None => ReleasePlan::default(),
        };
        if let Some(release) = &self.release {
            plan.release_id = release.clone();
        }
        if let Some(waves) = self.waves {
            plan.num_waves = waves;
        }
        if let Some(clusters) = self.clusters {
            plan.clusters_per_wave = clusters;
        }
        if let Some(apps) = self.apps {
            plan.apps_per_bundle = apps;
        }
        if let Some(secs) = self.app_secs {
            plan.app_deploy_duration = seconds("--app-secs", secs)?;
        }
        if let Some(fail) = &self.fail {
            plan.failure_scenario = fail.parse()?;
        }
        if let Some(secs) = self.app_timeout_secs {
            plan.app_timeout = Some(seconds("--app-timeout-secs", secs)?);
        }
        plan.validate()?;
        Ok(plan)
    }
}

pub fn seconds(flag: &str, secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("{flag}: invalid duration {secs}"))
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,

    /// Signal cancellation after this many seconds.
    #[arg(long)]
    pub cancel_after_secs: Option<f64>,

    /// Progress log interval, in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub watch_secs: f64,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,

    /// Print the resolved plan as TOML instead of the tree.
    #[arg(long)]
    pub emit_toml: bool,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wavefront_engine::FailureScenario;

    #[test]
    fn defaults_without_flags() {
        let plan = ShapeArgs::default().resolve().unwrap();
        assert_eq!(plan, ReleasePlan::default());
    }

    #[test]
    fn flags_override_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[release]\nrelease_id = \"release:from-file\"\nnum_waves = 3\napps_per_bundle = 5"
        )
        .unwrap();

        let args = ShapeArgs {
            plan: Some(file.path().to_path_buf()),
            waves: Some(1),
            fail: Some("app_failure".into()),
            app_secs: Some(0.25),
            ..Default::default()
        };
        let plan = args.resolve().unwrap();
        assert_eq!(plan.release_id, "release:from-file");
        assert_eq!(plan.num_waves, 1);
        assert_eq!(plan.apps_per_bundle, 5);
        assert_eq!(plan.app_deploy_duration, Duration::from_millis(250));
        assert_eq!(plan.failure_scenario, FailureScenario::second_app());
    }

    #[test]
    fn rejects_bad_values() {
        let args = ShapeArgs {
            clusters: Some(0),
            ..Default::default()
        };
        assert!(args.resolve().is_err());

        assert!(seconds("--app-secs", -1.0).is_err());
        assert!(seconds("--app-secs", f64::NAN).is_err());
    }
}

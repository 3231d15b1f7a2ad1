//! Collection configuration.
//!
//! Loaded from a TOML file and overridable from environment variables prefixed
//! `DUALARM_`, with nested keys separated by `__`:
//!
//! ```toml
//! mode = "augmentation"
//! base_body = "base_link"
//! save_video = false
//!
//! [timing]
//! time_step = 0.001
//! frame_skip = 20
//!
//! [[arms]]
//! name = "left_arm"
//! side = "left"
//! ee_site = "ee_center_site"
//! joint_names = ["J1_l", "J2_l"]
//! motor_names = ["M1_l", "M2_l"]
//!
//! [augmentation]
//! strategy = "smooth"
//! noise = 0.001
//! factor = 3
//!
//! [replay]
//! dataset_dir = "/data/demos"
//! ```
//!
//! `DUALARM_TIMING__FRAME_SKIP=10` overrides `timing.frame_skip`.

use crate::error::{CollectError, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "DUALARM_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub mode: CollectionMode,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Body whose frame arm goals are expressed in.
    pub base_body: String,
    #[serde(default)]
    pub arms: Vec<ArmConfig>,
    #[serde(default)]
    pub grippers: Vec<GripperConfig>,
    pub augmentation: Option<AugmentationConfig>,
    pub replay: Option<ReplayConfig>,
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub save_video: bool,
    #[serde(default)]
    pub disabled_actuator_groups: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// Episodes are driven by a live operator.
    #[default]
    Teleoperation,
    /// Episodes replay recorded units, optionally augmented.
    Augmentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Position of this side's block in flattened dual-arm samples.
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Physics step in seconds.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Physics steps per control tick.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            time_step: default_time_step(),
            frame_skip: default_frame_skip(),
        }
    }
}

impl TimingConfig {
    /// Nominal wall-clock length of one control tick.
    pub fn tick_period(&self) -> Result<Duration> {
        let secs = self.time_step * self.frame_skip as f64;
        Duration::try_from_secs_f64(secs).map_err(|err| {
            CollectError::config(format!("tick period of {secs} s is not representable: {err}"))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    pub name: String,
    pub side: Side,
    /// Site tracked by the arm's pose solver.
    pub ee_site: String,
    /// Joints driven by the pose solver.
    pub joint_names: Vec<String>,
    pub motor_names: Vec<String>,
    #[serde(default)]
    pub motor_init: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GripperConfig {
    pub name: String,
    pub side: Side,
    pub actuator_names: Vec<String>,
    /// `[min, max]` per actuator.
    pub actuator_ranges: Vec<[f32; 2]>,
    #[serde(default)]
    pub init_ctrl: Vec<f32>,
}

impl GripperConfig {
    pub fn ranges(&self) -> Vec<(f32, f32)> {
        self.actuator_ranges.iter().map(|[lo, hi]| (*lo, *hi)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentationStrategy {
    #[default]
    Adaptive,
    Smooth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    #[serde(default)]
    pub strategy: AugmentationStrategy,
    /// Bound of the uniform noise added to synthetic samples.
    #[serde(default)]
    pub noise: f32,
    /// Density factor for the smooth strategy.
    #[serde(default = "default_factor")]
    pub factor: usize,
    /// Seed for reproducible noise; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            strategy: AugmentationStrategy::default(),
            noise: 0.0,
            factor: default_factor(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory holding one sub-directory per recorded unit.
    pub dataset_dir: PathBuf,
    /// Unit document path relative to each unit directory.
    #[serde(default = "default_unit_file")]
    pub unit_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    #[serde(default = "default_unit_file")]
    pub unit_file: PathBuf,
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,
}

fn default_time_step() -> f64 {
    0.001
}

fn default_frame_skip() -> u32 {
    20
}

fn default_factor() -> usize {
    3
}

fn default_unit_file() -> PathBuf {
    PathBuf::from("unit.json")
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("video")
}

impl CollectionConfig {
    /// Loads `path`, applies `DUALARM_` environment overrides and validates the result.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Parses an inline TOML document without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(Figment::from(Toml::string(toml)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.timing.time_step.is_finite() || self.timing.time_step <= 0.0 {
            return Err(CollectError::config(format!(
                "timing.time_step must be positive, got {}",
                self.timing.time_step
            )));
        }
        if self.timing.frame_skip == 0 {
            return Err(CollectError::config("timing.frame_skip must be at least 1"));
        }
        if self.base_body.is_empty() {
            return Err(CollectError::config("base_body is required"));
        }

        let mut sides = HashSet::new();
        for arm in &self.arms {
            if !sides.insert(arm.side) {
                return Err(CollectError::config(format!(
                    "more than one arm on side {:?}",
                    arm.side
                )));
            }
            check_init(&arm.name, arm.motor_names.len(), arm.motor_init.len())?;
        }

        let mut sides = HashSet::new();
        for gripper in &self.grippers {
            if !sides.insert(gripper.side) {
                return Err(CollectError::config(format!(
                    "more than one gripper on side {:?}",
                    gripper.side
                )));
            }
            if gripper.actuator_ranges.len() != gripper.actuator_names.len() {
                return Err(CollectError::config(format!(
                    "gripper '{}' has {} actuators but {} ranges",
                    gripper.name,
                    gripper.actuator_names.len(),
                    gripper.actuator_ranges.len()
                )));
            }
            if let Some([lo, hi]) = gripper.actuator_ranges.iter().find(|[lo, hi]| lo > hi) {
                return Err(CollectError::config(format!(
                    "gripper '{}' has inverted range [{lo}, {hi}]",
                    gripper.name
                )));
            }
            check_init(
                &gripper.name,
                gripper.actuator_names.len(),
                gripper.init_ctrl.len(),
            )?;
        }

        if let Some(aug) = &self.augmentation {
            if aug.factor == 0 {
                return Err(CollectError::config("augmentation.factor must be at least 1"));
            }
            if !aug.noise.is_finite() || aug.noise < 0.0 {
                return Err(CollectError::config(format!(
                    "augmentation.noise must be a non-negative number, got {}",
                    aug.noise
                )));
            }
        }

        if self.mode == CollectionMode::Augmentation && self.replay.is_none() {
            return Err(CollectError::config(
                "augmentation mode requires a [replay] section",
            ));
        }
        Ok(())
    }
}

fn check_init(owner: &str, names: usize, init: usize) -> Result<()> {
    if init != 0 && init != names {
        return Err(CollectError::config(format!(
            "'{owner}' has {names} actuators but {init} initial values"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        base_body = "base_link"
    "#;

    #[test]
    fn defaults_fill_timing_and_mode() {
        let config = CollectionConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.mode, CollectionMode::Teleoperation);
        assert_eq!(config.timing.frame_skip, 20);
        assert_eq!(config.timing.tick_period().unwrap(), Duration::from_millis(20));
        assert!(config.augmentation.is_none());
    }

    #[test]
    fn non_finite_time_step_is_rejected() {
        let err = CollectionConfig::from_toml_str(
            r#"
            base_body = "base_link"

            [timing]
            time_step = inf
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CollectError::Configuration(_)));
    }

    #[test]
    fn unrepresentable_tick_period_is_an_error() {
        for time_step in [f64::INFINITY, f64::NAN, f64::MAX, -0.5] {
            let timing = TimingConfig {
                time_step,
                frame_skip: 20,
            };
            assert!(
                matches!(timing.tick_period(), Err(CollectError::Configuration(_))),
                "{time_step}"
            );
        }
        let zero = TimingConfig {
            time_step: 0.0,
            frame_skip: 1,
        };
        assert_eq!(zero.tick_period().unwrap(), Duration::ZERO);
    }

    #[test]
    fn file_values_yield_to_environment() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "collect.toml",
                r#"
                base_body = "base_link"
                save_video = true

                [timing]
                time_step = 0.002
                frame_skip = 10
                "#,
            )?;
            jail.set_env("DUALARM_TIMING__FRAME_SKIP", "5");
            jail.set_env("DUALARM_BASE_BODY", "torso");

            let config = CollectionConfig::load_from("collect.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.timing.frame_skip, 5);
            assert_eq!(config.timing.time_step, 0.002);
            assert_eq!(config.base_body, "torso");
            assert!(config.save_video);
            let period = config.timing.tick_period().unwrap();
            assert!((period.as_secs_f64() - 0.01).abs() < 1e-9);
            Ok(())
        });
    }

    #[test]
    fn environment_alone_supplies_required_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DUALARM_BASE_BODY", "base_link");
            let config = CollectionConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.base_body, "base_link");
            assert_eq!(config.timing.frame_skip, 20);
            Ok(())
        });
    }

    #[test]
    fn augmentation_requires_replay() {
        let err = CollectionConfig::from_toml_str(
            r#"
            mode = "augmentation"
            base_body = "base_link"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CollectError::Configuration(_)));
    }

    #[test]
    fn gripper_ranges_must_match_actuators() {
        let err = CollectionConfig::from_toml_str(
            r#"
            base_body = "base_link"

            [[grippers]]
            name = "left_gripper"
            side = "left"
            actuator_names = ["a", "b"]
            actuator_ranges = [[0.0, 1.0]]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 actuators but 1 ranges"));
    }

    #[test]
    fn augmentation_section_parses() {
        let config = CollectionConfig::from_toml_str(
            r#"
            mode = "augmentation"
            base_body = "base_link"

            [augmentation]
            strategy = "smooth"
            noise = 0.01

            [replay]
            dataset_dir = "/tmp/units"
            "#,
        )
        .unwrap();
        let aug = config.augmentation.unwrap();
        assert_eq!(aug.strategy, AugmentationStrategy::Smooth);
        assert_eq!(aug.factor, 3);
        assert_eq!(config.replay.unwrap().unit_file, PathBuf::from("unit.json"));
    }
}

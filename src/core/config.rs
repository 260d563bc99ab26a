#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::assembly::DEFAULT_PROJECTION_STEPS;
use crate::error::ConfigError;
use crate::experiment::{ExperimentSpec, Measurements, StimulusPolicy, Subject};

/// Run-level knobs shared by experiment drivers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// Steps per experiment.
    pub horizon: usize,
    pub experiment_count: usize,
    pub max_parallelism: usize,
    pub seed: u64,

    // Convergence diagnostic.
    pub convergence_window: usize,
    pub convergence_threshold: f32,

    /// Steps used by `project` when a driver does not pick its own.
    pub projection_steps: usize,
    /// Firing probability of sampled stimuli.
    pub stimulus_density: f32,
    pub measurements: Measurements,
}

impl Default for SimulationConfig {
    /// 5 experiments of 60 steps at density `1/sqrt(20000/15)`.
    fn default() -> Self {
        Self {
            horizon: 60,
            experiment_count: 5,
            max_parallelism: 4,
            seed: 0,
            convergence_window: 5,
            convergence_threshold: 0.05,
            projection_steps: DEFAULT_PROJECTION_STEPS,
            stimulus_density: 1.0 / (20000.0f32 / 15.0).sqrt(),
            measurements: Measurements::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_experiments(mut self, experiment_count: usize, max_parallelism: usize) -> Self {
        self.experiment_count = experiment_count;
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.horizon == 0 {
            return Err("horizon must be > 0");
        }
        if self.max_parallelism == 0 {
            return Err("max_parallelism must be > 0");
        }
        if self.convergence_window == 0 {
            return Err("convergence_window must be > 0");
        }
        if !(self.convergence_threshold > 0.0 && self.convergence_threshold <= 1.0) {
            return Err("convergence_threshold must be in (0, 1]");
        }
        if self.projection_steps == 0 {
            return Err("projection_steps must be > 0");
        }
        if !(0.0..=1.0).contains(&self.stimulus_density) {
            return Err("stimulus_density must be in [0, 1]");
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }

    /// Experiment spec for `subject` driven by one sampled stimulus per
    /// experiment.
    pub fn spec(&self, subject: Subject) -> Result<ExperimentSpec, ConfigError> {
        self.validate().map_err(ConfigError::Invalid)?;
        Ok(ExperimentSpec::new(
            subject,
            StimulusPolicy::PerExperiment {
                density: self.stimulus_density,
            },
            self.horizon,
        )
        .with_seed(self.seed)
        .with_measurements(self.measurements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::Orchestrator;
    use crate::region::testing::EchoRegion;

    #[test]
    fn default_is_valid() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert!((cfg.stimulus_density - 0.027386).abs() < 1e-5);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = SimulationConfig::default();
        cfg.horizon = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.convergence_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.stimulus_density = 1.2;
        assert!(matches!(
            cfg.spec(Subject::Region(Box::new(EchoRegion::new(4)))),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn spec_carries_run_settings() {
        let cfg = SimulationConfig::default()
            .with_seed(9)
            .with_experiments(3, 2);
        let spec = cfg.spec(Subject::Region(Box::new(EchoRegion::new(4)))).unwrap();
        assert_eq!(spec.seed, 9);
        assert_eq!(spec.horizon, 60);
        assert_eq!(Orchestrator::from_config(&cfg).max_parallelism(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_json_fills_defaults() {
        let cfg = SimulationConfig::from_json(r#"{ "horizon": 12, "seed": 3 }"#).unwrap();
        assert_eq!(cfg.horizon, 12);
        assert_eq!(cfg.seed, 3);
        assert_eq!(cfg.convergence_window, 5);

        assert!(matches!(
            SimulationConfig::from_json(r#"{ "horizon": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimulationConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}

use std::fs;

use serde::{Deserialize, Serialize};

use crate::schedulers::DiffusionConfig;

/// Parameters shared by the image pipeline and the noise schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HyperParameters {
    /// Number of images processed in parallel.
    pub batch_size: usize,
    /// Image size as (width, height).
    pub image_size: (u32, u32),
    /// Total number of time steps for the diffusion process, which takes an
    /// input image all the way to pure gaussian noise.
    pub num_time_steps: usize,
    pub diffusion: DiffusionConfig,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            batch_size: 64,
            image_size: (64, 64),
            num_time_steps: 1000,
            diffusion: DiffusionConfig::default(),
        }
    }
}

impl HyperParameters {
    pub fn from_file<T: AsRef<std::path::Path>>(path: T) -> anyhow::Result<Self> {
        let file = fs::read_to_string(path)?;
        let cfg: HyperParameters = toml::from_str(&file)?;
        Ok(cfg)
    }

    /// Replaces the step count when `num_time_steps` is set, leaves it as
    /// loaded otherwise.
    pub fn with_num_time_steps(mut self, num_time_steps: Option<usize>) -> Self {
        if let Some(num_time_steps) = num_time_steps {
            self.num_time_steps = num_time_steps;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::BetaSchedule;

    #[test]
    fn test_load_from_toml() {
        let cfg = HyperParameters::from_file("src/param.default.toml").unwrap();
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.image_size, (64, 64));
        assert_eq!(cfg.num_time_steps, 3);
        assert_eq!(cfg.diffusion.beta_schedule, BetaSchedule::Linear);
        assert_eq!(cfg.diffusion.beta_end, 0.02);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let cfg: HyperParameters = toml::from_str("num_time_steps = 50").unwrap();
        assert_eq!(cfg.num_time_steps, 50);
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.diffusion, DiffusionConfig::default());
    }

    #[test]
    fn test_step_count_from_file_survives_without_override() {
        let cfg: HyperParameters = toml::from_str("num_time_steps = 10").unwrap();
        assert_eq!(cfg.clone().with_num_time_steps(None).num_time_steps, 10);
        assert_eq!(cfg.with_num_time_steps(Some(25)).num_time_steps, 25);
    }
}

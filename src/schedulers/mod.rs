//! # Diffusion noise schedules
//!
//! A schedule fixes how much gaussian noise is injected at every discrete
//! time step of the forward diffusion process, and precomputes the cumulative
//! products that let any step be reached in closed form.
use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{DiffusionError, Result};

pub mod diffusion;
pub mod types;

pub use diffusion::Diffusion;
pub use types::TimeSteps;

/// Upper bound applied to the betas of the cosine schedule.
const MAX_COSINE_BETA: f64 = 0.999;

/// This represents how beta ranges from its minimum value to the maximum
/// over the diffusion process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BetaSchedule {
    /// Linear interpolation.
    Linear,
    /// Linear interpolation of the square root of beta.
    ScaledLinear,
    /// Glide cosine schedule
    SquaredcosCapV2,
}

impl BetaSchedule {
    /// Discretizes the schedule into `num_time_steps` betas. The cosine
    /// schedule ignores the bounds.
    pub fn betas(&self, beta_start: f64, beta_end: f64, num_time_steps: usize) -> Vec<f64> {
        match self {
            BetaSchedule::Linear => linspace(beta_start, beta_end, num_time_steps),
            BetaSchedule::ScaledLinear => {
                linspace(beta_start.sqrt(), beta_end.sqrt(), num_time_steps)
                    .into_iter()
                    .map(|b| b * b)
                    .collect()
            }
            BetaSchedule::SquaredcosCapV2 => betas_for_alpha_bar(num_time_steps, MAX_COSINE_BETA),
        }
    }
}

/// Evenly spaced values over `[start, end]`, mimicking torch.linspace().
fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps - 1) as f64;
            (0..steps).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Create a beta schedule that discretizes the given alpha_t_bar function,
/// which defines the cumulative product of `(1-beta)` over time from
/// `t = [0,1]`.
///
/// Contains a function `alpha_bar` that takes an argument `t` and transforms
/// it to the cumulative product of `(1-beta)` up to that part of the
/// diffusion process.
pub(crate) fn betas_for_alpha_bar(num_diffusion_timesteps: usize, max_beta: f64) -> Vec<f64> {
    let alpha_bar = |t: f64| f64::cos((t + 0.008) / 1.008 * std::f64::consts::FRAC_PI_2).powi(2);
    let n = num_diffusion_timesteps as f64;
    (0..num_diffusion_timesteps)
        .map(|i| {
            let t1 = i as f64 / n;
            let t2 = (i + 1) as f64 / n;
            (1.0 - alpha_bar(t2) / alpha_bar(t1)).min(max_beta)
        })
        .collect()
}

/// Parameters shaping the per-step betas.
///
/// The bounds are only checked for the linear schedules, the cosine schedule
/// does not read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffusionConfig {
    /// The value of beta at the first time step.
    pub beta_start: f64,
    /// The value of beta at the last time step.
    pub beta_end: f64,
    /// How beta evolves between the two.
    pub beta_schedule: BetaSchedule,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            beta_start: 0.0001,
            beta_end: 0.02,
            beta_schedule: BetaSchedule::Linear,
        }
    }
}

impl DiffusionConfig {
    pub fn from_file<T: AsRef<std::path::Path>>(path: T) -> anyhow::Result<Self> {
        let file = fs::read_to_string(path)?;
        let cfg: DiffusionConfig = toml::from_str(&file)?;
        Ok(cfg)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.beta_schedule == BetaSchedule::SquaredcosCapV2 {
            return Ok(());
        }
        if !self.beta_start.is_finite() || !self.beta_end.is_finite() {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "beta bounds must be finite, got [{}, {}]",
                self.beta_start, self.beta_end
            )));
        }
        if self.beta_start > self.beta_end {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "beta_start {} is greater than beta_end {}",
                self.beta_start, self.beta_end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_config() {
        let cfg = DiffusionConfig::from_file("src/schedulers/config.default.toml").unwrap();
        assert_eq!(cfg, DiffusionConfig::default());
    }

    #[test]
    fn test_load_cosine_config() {
        let cfg = DiffusionConfig::from_file("src/schedulers/config.cosine.toml").unwrap();
        assert_eq!(cfg.beta_schedule, BetaSchedule::SquaredcosCapV2);
    }

    #[test]
    fn test_linear_betas_hit_both_bounds() {
        let betas = BetaSchedule::Linear.betas(0.0001, 0.02, 3);
        assert_eq!(betas.len(), 3);
        assert!((betas[0] - 0.0001).abs() < 1e-12);
        assert!((betas[1] - 0.01005).abs() < 1e-12);
        assert!((betas[2] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_single_step_uses_beta_start() {
        assert_eq!(BetaSchedule::Linear.betas(0.0001, 0.02, 1), vec![0.0001]);
    }

    #[test]
    fn test_scaled_linear_betas_hit_both_bounds() {
        let betas = BetaSchedule::ScaledLinear.betas(0.00085, 0.012, 50);
        assert!((betas[0] - 0.00085).abs() < 1e-12);
        assert!((betas[49] - 0.012).abs() < 1e-12);
        assert!(betas.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cosine_betas_are_increasing_and_capped() {
        let betas = betas_for_alpha_bar(1000, MAX_COSINE_BETA);
        assert_eq!(betas.len(), 1000);
        assert!(betas[0] > 0.0);
        assert!(betas.windows(2).all(|w| w[0] <= w[1]));
        assert!(betas.iter().all(|&b| b <= MAX_COSINE_BETA));
    }

    #[test]
    fn test_reversed_bounds_are_rejected() {
        let cfg = DiffusionConfig {
            beta_start: 0.02,
            beta_end: 0.0001,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(DiffusionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_cosine_schedule_ignores_bounds() {
        let cfg = DiffusionConfig {
            beta_start: 0.02,
            beta_end: f64::NAN,
            beta_schedule: BetaSchedule::SquaredcosCapV2,
        };
        assert!(cfg.validate().is_ok());
    }
}

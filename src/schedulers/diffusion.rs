//! # DDPM forward process
//!
//! Closed-form noising and exact un-noising of image batches following
//! formula (4) of https://arxiv.org/pdf/2006.11239.pdf:
//! `x_t = sqrt(alpha_bar_t) * x_0 + sqrt(1 - alpha_bar_t) * noise`.
//!
//! Every operation costs the same whatever the time step, since no
//! intermediate step is ever simulated.
use tch::Tensor;
use tracing::{debug, trace, warn};

use super::{types::TimeSteps, DiffusionConfig};
use crate::error::{DiffusionError, Result};

/// Below this cumulative alpha, reconstructing x_0 scales errors in the
/// noise by more than 30x.
const SENSITIVE_ALPHA_BAR: f64 = 1e-3;

/// A precomputed noise schedule. Immutable once built, so a single value can
/// be shared between threads.
#[derive(Debug, Clone)]
pub struct Diffusion {
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
    config: DiffusionConfig,
}

impl Diffusion {
    /// A linear schedule of `num_time_steps` steps with the default bounds.
    pub fn new(num_time_steps: usize) -> Result<Self> {
        Self::with_config(num_time_steps, DiffusionConfig::default())
    }

    pub fn with_config(num_time_steps: usize, config: DiffusionConfig) -> Result<Self> {
        if num_time_steps == 0 {
            return Err(DiffusionError::InvalidConfiguration(
                "num_time_steps must be positive".to_string(),
            ));
        }
        config.validate()?;

        let betas =
            config.beta_schedule.betas(config.beta_start, config.beta_end, num_time_steps);
        let out_of_range = betas.iter().enumerate().find(|(_, &b)| !(b > 0.0 && b < 1.0));
        if let Some((t, beta)) = out_of_range {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "beta at step {t} is {beta}, expected a value in (0, 1)"
            )));
        }
        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();
        let alphas_cumprod: Vec<f64> = alphas
            .iter()
            .scan(1.0, |prod, alpha| {
                *prod *= alpha;
                Some(*prod)
            })
            .collect();

        debug!(
            num_time_steps,
            schedule = ?config.beta_schedule,
            alpha_bar_first = alphas_cumprod[0],
            alpha_bar_last = alphas_cumprod[num_time_steps - 1],
            "built diffusion schedule"
        );
        Ok(Self {
            betas,
            alphas,
            alphas_cumprod,
            config,
        })
    }

    pub fn config(&self) -> &DiffusionConfig {
        &self.config
    }

    pub fn num_time_steps(&self) -> usize {
        self.betas.len()
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Cumulative products of the alphas, aka alpha_bar.
    pub fn alphas_cumprod(&self) -> &[f64] {
        &self.alphas_cumprod
    }

    /// Noises `original` straight to `time_steps`.
    ///
    /// Fresh standard normal noise is drawn when `noise` is `None`. The noise
    /// that was used is returned alongside the noised batch so it can be fed
    /// back to [`Diffusion::remove_noise`] or [`Diffusion::decrement_noise`].
    pub fn add_noise(
        &self,
        original: &Tensor,
        time_steps: &TimeSteps,
        noise: Option<Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        self.check(original, time_steps, 0)?;
        let noise = match noise {
            Some(noise) => {
                check_same_shape(original, &noise)?;
                noise
            }
            None => Tensor::randn_like(original),
        };
        trace!(?time_steps, "add_noise");
        let noised = self.mix(original, &noise, time_steps);
        Ok((noised, noise))
    }

    /// Recovers x_0 from `noised` given the exact noise that produced it.
    ///
    /// This is an algebraic inverse, not a learned denoiser. Values are not
    /// clamped. Near the last steps alpha_bar gets close to 0 and any error
    /// in `noise` is amplified by `1 / sqrt(alpha_bar)`.
    pub fn remove_noise(
        &self,
        noised: &Tensor,
        time_steps: &TimeSteps,
        noise: &Tensor,
    ) -> Result<Tensor> {
        self.check(noised, time_steps, 0)?;
        check_same_shape(noised, noise)?;
        trace!(?time_steps, "remove_noise");
        Ok(self.unmix(noised, noise, time_steps))
    }

    /// Moves `noised` from step t to step t - 1 along the forward trajectory
    /// of the same noise.
    ///
    /// Only meaningful when the true noise is known, e.g. for inspecting a
    /// trajectory. Generative sampling needs a predicted noise and the
    /// stochastic posterior instead.
    pub fn decrement_noise(
        &self,
        noised: &Tensor,
        time_steps: &TimeSteps,
        noise: &Tensor,
    ) -> Result<Tensor> {
        self.check(noised, time_steps, 1)?;
        check_same_shape(noised, noise)?;
        trace!(?time_steps, "decrement_noise");
        let original = self.unmix(noised, noise, time_steps);
        Ok(self.mix(&original, noise, &time_steps.shifted(-1)))
    }

    fn check(&self, xs: &Tensor, time_steps: &TimeSteps, min: i64) -> Result<()> {
        time_steps.check_range(min, self.num_time_steps() as i64)?;
        time_steps.check_batch(xs)
    }

    fn mix(&self, original: &Tensor, noise: &Tensor, time_steps: &TimeSteps) -> Tensor {
        self.scale(original, time_steps, |alpha_bar| alpha_bar.sqrt())
            + self.scale(noise, time_steps, |alpha_bar| (1.0 - alpha_bar).sqrt())
    }

    fn unmix(&self, noised: &Tensor, noise: &Tensor, time_steps: &TimeSteps) -> Tensor {
        let smallest = time_steps
            .values()
            .iter()
            .map(|&t| self.alphas_cumprod[t as usize])
            .fold(f64::INFINITY, f64::min);
        if smallest < SENSITIVE_ALPHA_BAR {
            warn!(
                alpha_bar = smallest,
                "reconstruction amplifies noise error by 1/sqrt(alpha_bar)"
            );
        }
        let signal =
            noised - self.scale(noise, time_steps, |alpha_bar| (1.0 - alpha_bar).sqrt());
        self.scale(&signal, time_steps, |alpha_bar| 1.0 / alpha_bar.sqrt())
    }

    /// Multiplies each batch element by `coeff(alpha_bar[t])` for its step.
    /// Steps must have been validated.
    fn scale(&self, xs: &Tensor, time_steps: &TimeSteps, coeff: impl Fn(f64) -> f64) -> Tensor {
        match time_steps {
            TimeSteps::Single(t) => xs * coeff(self.alphas_cumprod[*t as usize]),
            TimeSteps::PerSample(ts) => {
                let coeffs: Vec<f64> =
                    ts.iter().map(|&t| coeff(self.alphas_cumprod[t as usize])).collect();
                // (batch, 1, 1, ...) so the coefficients broadcast over the remaining dims.
                let mut shape = vec![1i64; xs.dim().max(1)];
                shape[0] = coeffs.len() as i64;
                let coeffs = Tensor::from_slice(&coeffs)
                    .to_kind(xs.kind())
                    .to_device(xs.device())
                    .view(shape.as_slice());
                xs * coeffs
            }
        }
    }
}

fn check_same_shape(xs: &Tensor, noise: &Tensor) -> Result<()> {
    let (expected, actual) = (xs.size(), noise.size());
    if expected != actual {
        return Err(DiffusionError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

use tch::{Device, Kind, Tensor};

use crate::error::{DiffusionError, Result};

/// The diffusion time step(s) a batch sits at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSteps {
    /// One step broadcast to the whole batch.
    Single(i64),
    /// One step per batch element, in batch order.
    PerSample(Vec<i64>),
}

impl TimeSteps {
    pub fn values(&self) -> &[i64] {
        match self {
            TimeSteps::Single(t) => std::slice::from_ref(t),
            TimeSteps::PerSample(ts) => ts,
        }
    }

    /// The same steps moved by `delta`.
    pub fn shifted(&self, delta: i64) -> Self {
        match self {
            TimeSteps::Single(t) => TimeSteps::Single(t + delta),
            TimeSteps::PerSample(ts) => {
                TimeSteps::PerSample(ts.iter().map(|t| t + delta).collect())
            }
        }
    }

    /// Rejects any step outside `[min, max)`.
    pub(crate) fn check_range(&self, min: i64, max: i64) -> Result<()> {
        match self.values().iter().find(|&&t| t < min || t >= max) {
            Some(&time_step) => Err(DiffusionError::InvalidTimeStep { time_step, min, max }),
            None => Ok(()),
        }
    }

    /// Per-sample steps must line up with the leading (batch) dimension.
    pub(crate) fn check_batch(&self, xs: &Tensor) -> Result<()> {
        if let TimeSteps::PerSample(ts) = self {
            let batch = xs.size().first().copied();
            if batch != Some(ts.len() as i64) {
                return Err(DiffusionError::ShapeMismatch {
                    expected: batch.into_iter().collect(),
                    actual: vec![ts.len() as i64],
                });
            }
        }
        Ok(())
    }
}

impl From<i64> for TimeSteps {
    fn from(t: i64) -> Self {
        TimeSteps::Single(t)
    }
}

impl From<Vec<i64>> for TimeSteps {
    fn from(ts: Vec<i64>) -> Self {
        TimeSteps::PerSample(ts)
    }
}

impl From<&[i64]> for TimeSteps {
    fn from(ts: &[i64]) -> Self {
        TimeSteps::PerSample(ts.to_vec())
    }
}

/// Reads integer time steps out of a tensor. A tensor holding a single value
/// is broadcast to the batch, anything else is taken per sample.
impl TryFrom<&Tensor> for TimeSteps {
    type Error = tch::TchError;

    fn try_from(ts: &Tensor) -> std::result::Result<Self, Self::Error> {
        let flat = ts.to_device(Device::Cpu).to_kind(Kind::Int64).flatten(0, -1);
        let values = Vec::<i64>::try_from(&flat)?;
        Ok(match values.as_slice() {
            [t] => TimeSteps::Single(*t),
            _ => TimeSteps::PerSample(values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tensor_of_one_value_broadcasts() {
        let ts = Tensor::from_slice(&[2i64]).reshape([1, 1]);
        assert_eq!(TimeSteps::try_from(&ts).unwrap(), TimeSteps::Single(2));
    }

    #[test]
    fn test_from_tensor_per_sample() {
        let ts = Tensor::from_slice(&[0i64, 4, 7]);
        assert_eq!(TimeSteps::try_from(&ts).unwrap(), TimeSteps::PerSample(vec![0, 4, 7]));
    }

    #[test]
    fn test_check_range() {
        assert!(TimeSteps::Single(0).check_range(0, 3).is_ok());
        assert!(TimeSteps::Single(2).check_range(0, 3).is_ok());
        assert_eq!(
            TimeSteps::from(vec![1, 3]).check_range(0, 3),
            Err(DiffusionError::InvalidTimeStep { time_step: 3, min: 0, max: 3 })
        );
        assert_eq!(
            TimeSteps::Single(-1).check_range(0, 3),
            Err(DiffusionError::InvalidTimeStep { time_step: -1, min: 0, max: 3 })
        );
    }

    #[test]
    fn test_shifted() {
        assert_eq!(TimeSteps::Single(2).shifted(-1), TimeSteps::Single(1));
        assert_eq!(TimeSteps::from(vec![3, 5]).shifted(-1), TimeSteps::PerSample(vec![2, 4]));
    }

    #[test]
    fn test_check_batch() {
        let xs = Tensor::zeros([2, 1, 2, 2], (Kind::Float, Device::Cpu));
        assert!(TimeSteps::Single(0).check_batch(&xs).is_ok());
        assert!(TimeSteps::from(vec![0, 1]).check_batch(&xs).is_ok());
        assert_eq!(
            TimeSteps::from(vec![0, 1, 2]).check_batch(&xs),
            Err(DiffusionError::ShapeMismatch { expected: vec![2], actual: vec![3] })
        );
    }
}

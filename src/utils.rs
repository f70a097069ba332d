use tch::{Device, Kind, Tensor};

/// Picks the fastest backend available: CUDA, then MPS, then the CPU.
///
/// The device is meant to be passed explicitly to whatever allocates tensors,
/// the noise schedule itself never looks at it.
pub fn get_optimal_device() -> Device {
    if tch::Cuda::is_available() {
        Device::Cuda(0)
    } else if tch::utils::has_mps() {
        Device::Mps
    } else {
        Device::Cpu
    }
}

/// Appends the time step to `basename`, keeping its extension.
pub fn output_filename(basename: &str, time_step: Option<usize>) -> String {
    match time_step {
        None => basename.to_string(),
        Some(time_step) => match basename.rsplit_once('.') {
            None => format!("{basename}-{time_step}.png"),
            Some((filename_no_extension, extension)) => {
                format!("{filename_no_extension}-{time_step}.{extension}")
            }
        },
    }
}

/// Number of NaN or infinite elements in `xs`.
pub fn count_non_finite(xs: &Tensor) -> i64 {
    xs.isfinite().logical_not().sum(Kind::Int64).int64_value(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("out.png", None), "out.png");
        assert_eq!(output_filename("out.png", Some(2)), "out-2.png");
        assert_eq!(output_filename("./dir/out.jpg", Some(0)), "./dir/out-0.jpg");
        assert_eq!(output_filename("out", Some(1)), "out-1.png");
    }

    #[test]
    fn test_count_non_finite() {
        let xs = Tensor::from_slice(&[1.0f64, f64::NAN, f64::INFINITY, -2.0]);
        assert_eq!(count_non_finite(&xs), 2);
    }
}

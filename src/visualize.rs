//! Tensors shown by the forward / backward diffusion visualization.
use tch::Tensor;

use crate::{
    error::Result,
    schedulers::{Diffusion, TimeSteps},
};

/// One titled image of the visualization.
#[derive(Debug)]
pub struct Panel {
    pub title: String,
    pub image: Tensor,
}

/// The original image, the image noised to `time_step`, the image recovered
/// from it and, when `time_step >= 1`, the image one step earlier. All use
/// the same noise, which is returned too. Values are not clamped.
pub fn forward_backward_panels(
    diffusion: &Diffusion,
    image: &Tensor,
    time_step: i64,
    noise: Option<Tensor>,
) -> Result<(Vec<Panel>, Tensor)> {
    let n = diffusion.num_time_steps();
    let steps = TimeSteps::Single(time_step);
    let (image_t, noise) = diffusion.add_noise(image, &steps, noise)?;
    let image_0 = diffusion.remove_noise(&image_t, &steps, &noise)?;

    let mut panels = vec![
        Panel {
            title: format!("T = 0/{n} (original image)"),
            image: image.shallow_clone(),
        },
        Panel {
            title: format!("T = {time_step}/{n} (add_noise)"),
            image: image_t.shallow_clone(),
        },
        Panel {
            title: format!("T = 0/{n} (remove_noise)"),
            image: image_0,
        },
    ];
    if time_step >= 1 {
        let image_t_minus_one = diffusion.decrement_noise(&image_t, &steps, &noise)?;
        panels.push(Panel {
            title: format!("T = {}/{n} (decrement_noise)", time_step - 1),
            image: image_t_minus_one,
        });
    }
    Ok((panels, noise))
}

/// Walks `noised` back from `time_step` to 0 one step at a time, returning
/// the state at every step from `time_step - 1` down to 0.
pub fn walk_back(
    diffusion: &Diffusion,
    noised: &Tensor,
    time_step: i64,
    noise: &Tensor,
) -> Result<Vec<(i64, Tensor)>> {
    let mut current = noised.shallow_clone();
    let mut states = Vec::with_capacity(time_step.max(0) as usize);
    for t in (1..=time_step).rev() {
        current = diffusion.decrement_noise(&current, &TimeSteps::Single(t), noise)?;
        states.push((t - 1, current.shallow_clone()));
    }
    Ok(states)
}

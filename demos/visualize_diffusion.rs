//! Visualizes the forward & backward passes of a diffusion noise schedule.
//!
//! Writes the original image, the image noised to `--time-step`, the image
//! recovered from it and, from step 1 on, the image one step earlier, side
//! by side.
use std::time::SystemTime;

use clap::Parser;
use image_generator::{
    param::HyperParameters,
    schedulers::Diffusion,
    transforms::{image_to_tensor, tensor_to_image},
    utils::{count_non_finite, get_optimal_device, output_filename},
    visualize::{forward_backward_panels, walk_back},
};
use tch::{Device, Tensor};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_NUM_TIME_STEPS: usize = 3;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The image to noise.
    #[arg(long)]
    image: String,

    /// Optional TOML file with the hyper-parameters.
    #[arg(long)]
    config: Option<String>,

    /// Overrides the number of diffusion steps, otherwise taken from
    /// `--config` (3 without a config file).
    #[arg(long)]
    num_time_steps: Option<usize>,

    /// Noise at this time step is applied.
    #[arg(long, default_value = "2")]
    time_step: i64,

    #[arg(long, default_value = "./diffusion.png")]
    output: String,

    /// Also write every step from `time_step` down to 0.
    #[arg(long)]
    intermediary_images: bool,

    #[arg(long, default_value = "1337")]
    seed: i64,

    /// Run on the CPU even when an accelerator is available.
    #[arg(long)]
    cpu: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    tracing: bool,
}

fn save(xs: &Tensor, path: &str) -> anyhow::Result<()> {
    let non_finite = count_non_finite(xs);
    if non_finite > 0 {
        warn!(path, non_finite, "image has non finite values");
    }
    tensor_to_image(&xs.to_device(Device::Cpu))?.save(path)?;
    info!(path, "saved image");
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let params = match &args.config {
        Some(path) => HyperParameters::from_file(path)?,
        None => HyperParameters {
            batch_size: 1,
            num_time_steps: DEFAULT_NUM_TIME_STEPS,
            ..Default::default()
        },
    };
    let params = params.with_num_time_steps(args.num_time_steps);

    let device = if args.cpu { Device::Cpu } else { get_optimal_device() };
    info!(
        ?device,
        num_time_steps = params.num_time_steps,
        time_step = args.time_step,
        "visualizing diffusion"
    );
    tch::manual_seed(args.seed);

    let start = SystemTime::now();
    let diffusion = Diffusion::with_config(params.num_time_steps, params.diffusion.clone())?;
    let image = image_to_tensor(&args.image, params.image_size, device)?;

    let (panels, noise) = forward_backward_panels(&diffusion, &image, args.time_step, None)?;
    if panels.len() < 4 {
        warn!("no decrement_noise panel at time step 0");
    }
    for panel in panels.iter() {
        info!(panel = %panel.title, "panel");
    }
    let images: Vec<Tensor> = panels.iter().map(|p| p.image.clamp(-1., 1.)).collect();
    save(&Tensor::cat(&images, 3), &args.output)?;

    if args.intermediary_images {
        let image_t = &panels[1].image;
        save(image_t, &output_filename(&args.output, Some(args.time_step as usize)))?;
        for (t, image) in walk_back(&diffusion, image_t, args.time_step, &noise)? {
            save(&image, &output_filename(&args.output, Some(t as usize)))?;
        }
    }
    info!(elapsed = ?SystemTime::now().duration_since(start)?, "done");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (chrome_layer, _guard) = if args.tracing {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(chrome_layer)
        .init();

    run(args)
}

//! Conversions between RGB images and tensors normalised to [-1, 1].
use std::path::Path;

use anyhow::Context;
use image::{imageops::FilterType, RgbImage};
use tch::{Device, Kind, Tensor};

/// Loads an image, resizes it to `(width, height)` and returns a
/// (1, 3, height, width) float tensor with values in [-1, 1].
pub fn image_to_tensor<P: AsRef<Path>>(
    path: P,
    size: (u32, u32),
    device: Device,
) -> anyhow::Result<Tensor> {
    let path = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("error opening {:?}", path.to_string_lossy()))?;
    let (width, height) = size;
    let image = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    Ok(rgb_to_tensor(&image, device))
}

pub fn rgb_to_tensor(image: &RgbImage, device: Device) -> Tensor {
    let (width, height) = image.dimensions();
    Tensor::from_slice(image.as_raw())
        .view([height as i64, width as i64, 3])
        .permute([2, 0, 1])
        .unsqueeze(0)
        .to_kind(Kind::Float)
        .to_device(device)
        / 127.5
        - 1.
}

/// Converts a (3, h, w) or (1, 3, h, w) tensor back to an image, clamping
/// values to [-1, 1] first.
pub fn tensor_to_image(xs: &Tensor) -> anyhow::Result<RgbImage> {
    let xs = match xs.size().as_slice() {
        [1, 3, _, _] => xs.squeeze_dim(0),
        [3, _, _] => xs.shallow_clone(),
        size => anyhow::bail!("expected a (3, h, w) or (1, 3, h, w) tensor, got {size:?}"),
    };
    let (height, width) = (xs.size()[1], xs.size()[2]);
    let pixels = ((xs.clamp(-1., 1.) + 1.) * 127.5)
        .round()
        .to_kind(Kind::Uint8)
        .permute([1, 2, 0])
        .contiguous()
        .to_device(Device::Cpu)
        .flatten(0, -1);
    let pixels = Vec::<u8>::try_from(&pixels)?;
    RgbImage::from_raw(width as u32, height as u32, pixels)
        .context("pixel buffer does not match image size")
}

//! Image preprocessing.
//!
//! Reproduces the pipeline the classifier was trained on: decode, force RGB,
//! stretch to 227x227 with a bilinear (Triangle) kernel, scale to [0,1] and
//! apply the ImageNet per-channel normalization, batch of one. Deterministic
//! for identical input bytes.

use candle_core::{DType, Device, Tensor};

use crate::error::Error;

pub const INPUT_WIDTH: usize = 227;
pub const INPUT_HEIGHT: usize = 227;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Turn raw upload bytes into a `(1, 3, 227, 227)` f32 tensor on `device`.
///
/// The resize is a direct stretch; aspect ratio is intentionally not
/// preserved, matching the training preprocessing.
pub fn preprocess(bytes: &[u8], device: &Device) -> Result<Tensor, Error> {
    let image = image::load_from_memory(bytes)?;

    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        INPUT_WIDTH as u32,
        INPUT_HEIGHT as u32,
        image::imageops::FilterType::Triangle,
    );

    let data = resized.into_raw();
    let tensor = Tensor::from_vec(data, (INPUT_HEIGHT, INPUT_WIDTH, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t / 255.0)
        .map_err(Error::inference)?;

    let mean = Tensor::new(&IMAGENET_MEAN, device)
        .and_then(|t| t.reshape((3, 1, 1)))
        .map_err(Error::inference)?;
    let std = Tensor::new(&IMAGENET_STD, device)
        .and_then(|t| t.reshape((3, 1, 1)))
        .map_err(Error::inference)?;

    tensor
        .broadcast_sub(&mean)
        .and_then(|t| t.broadcast_div(&std))
        .and_then(|t| t.unsqueeze(0))
        .map_err(Error::inference)
}

//! Preprocessing of decoded imagery into training patches.
//!
//! Decoding satellite formats, radiometric calibration and reprojection happen
//! upstream; these helpers start from an already decoded `[channels, height, width]`
//! raster.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use image::{DynamicImage, GrayImage, ImageBuffer, Rgb};

use crate::error::UNetError;

const EPSILON: f32 = 1e-6;

#[derive(Config, Debug, PartialEq)]
pub enum Normalization {
    /// Rescale to `[0, 1]` using the raster's minimum and maximum.
    MinMax,
    /// Zero mean, unit standard deviation.
    ZScore,
}

pub fn normalize<B: Backend>(tensor: Tensor<B, 3>, method: &Normalization) -> Tensor<B, 3> {
    match method {
        Normalization::MinMax => {
            let min = tensor.clone().min().into_scalar().elem::<f32>();
            let max = tensor.clone().max().into_scalar().elem::<f32>();
            tensor.sub_scalar(min).div_scalar(max - min + EPSILON)
        }
        Normalization::ZScore => {
            let mean = tensor.clone().mean().into_scalar().elem::<f32>();
            let variance = tensor
                .clone()
                .sub_scalar(mean)
                .powf_scalar(2.0)
                .mean()
                .into_scalar()
                .elem::<f32>();
            tensor.sub_scalar(mean).div_scalar(variance.sqrt() + EPSILON)
        }
    }
}

#[derive(Config, Debug)]
pub struct PatchConfig {
    #[config(default = "[256, 256]")]
    pub patch_size: [usize; 2],
    /// Window step. Defaults to the patch size (non-overlapping).
    pub stride: Option<[usize; 2]>,
}

pub struct Patch<B: Backend> {
    /// Top-left corner `[row, column]` in the source raster.
    pub origin: [usize; 2],
    pub image: Tensor<B, 3>,
    pub mask: Option<Tensor<B, 3, Int>>,
}

/// Cuts `image` (and its `mask`, if any) into sliding-window patches.
///
/// Windows that would run past the raster border are skipped.
pub fn create_patches<B: Backend>(
    image: Tensor<B, 3>,
    mask: Option<Tensor<B, 3, Int>>,
    config: &PatchConfig,
) -> Result<Vec<Patch<B>>, UNetError> {
    let [channels, height, width] = image.dims();
    let [patch_height, patch_width] = config.patch_size;
    let [stride_y, stride_x] = config.stride.unwrap_or(config.patch_size);

    if patch_height == 0 || patch_width == 0 || stride_y == 0 || stride_x == 0 {
        return Err(UNetError::InvalidConfiguration(format!(
            "patch size {:?} and stride {:?} must be non-zero",
            config.patch_size, config.stride
        )));
    }

    if let Some(mask) = &mask {
        let [_, mask_height, mask_width] = mask.dims();
        if [mask_height, mask_width] != [height, width] {
            return Err(UNetError::Dataset(format!(
                "mask is {mask_height}x{mask_width} but image is {height}x{width}"
            )));
        }
    }

    if patch_height > height || patch_width > width {
        tracing::warn!(
            "Raster {}x{} is smaller than patch {}x{}, no patches created",
            height,
            width,
            patch_height,
            patch_width
        );
        return Ok(Vec::new());
    }

    let mut patches = Vec::new();
    for y in (0..=height - patch_height).step_by(stride_y) {
        for x in (0..=width - patch_width).step_by(stride_x) {
            let rows = y..y + patch_height;
            let cols = x..x + patch_width;

            patches.push(Patch {
                origin: [y, x],
                image: image.clone().slice([0..channels, rows.clone(), cols.clone()]),
                mask: mask.as_ref().map(|mask| {
                    let [mask_channels, _, _] = mask.dims();
                    mask.clone().slice([0..mask_channels, rows, cols])
                }),
            });
        }
    }

    tracing::debug!("Created {} patches from {}x{} raster", patches.len(), height, width);
    Ok(patches)
}

/// Writes patches as PNG files named `<stem>_patch_<i>.png` and `<stem>_mask_<i>.png`.
///
/// Image values are expected in `[0, 1]`; masks are written as raw class indices.
pub fn save_patches<B: Backend>(
    patches: &[Patch<B>],
    stem: &str,
    images_dir: &Path,
    masks_dir: &Path,
) -> Result<Vec<PathBuf>, UNetError> {
    std::fs::create_dir_all(images_dir)?;
    std::fs::create_dir_all(masks_dir)?;

    let mut written = Vec::with_capacity(patches.len());
    for (index, patch) in patches.iter().enumerate() {
        let image_path = images_dir.join(format!("{stem}_patch_{index}.png"));
        save_raster(patch.image.clone(), &image_path)?;
        written.push(image_path);

        if let Some(mask) = &patch.mask {
            let mask_path = masks_dir.join(format!("{stem}_mask_{index}.png"));
            mask_to_gray(mask.clone())?.save(&mask_path)?;
            written.push(mask_path);
        }
    }

    tracing::info!("Wrote {} files for {}", written.len(), stem);
    Ok(written)
}

/// Saves a `[channels, height, width]` raster in `[0, 1]` as 8-bit grayscale
/// (one channel) or RGB (first three channels).
pub fn save_raster<B: Backend>(raster: Tensor<B, 3>, path: &Path) -> Result<(), UNetError> {
    let [channels, height, width] = raster.dims();
    let values = raster
        .clamp(0.0, 1.0)
        .mul_scalar(255.0)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| UNetError::Dataset(format!("Unable to read raster values: {e:?}")))?;

    let plane = height * width;
    if channels >= 3 {
        let mut buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(width as u32, height as u32);
        for (index, pixel) in buffer.pixels_mut().enumerate() {
            *pixel = Rgb([0, 1, 2].map(|c| to_byte(values[c * plane + index])));
        }
        buffer.save(path)?;
    } else {
        let bytes: Vec<u8> = values[..plane].iter().map(|&v| to_byte(v)).collect();
        to_gray(bytes, height, width)?.save(path)?;
    }
    Ok(())
}

/// Decodes `image` into a `[channels, height, width]` tensor in `[0, 1]`.
///
/// One channel reads luminance, three read RGB and four RGBA.
pub fn image_to_tensor<B: Backend>(
    image: &DynamicImage,
    channels: usize,
    device: &B::Device,
) -> Result<Tensor<B, 3>, UNetError> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let interleaved = match channels {
        1 => image.to_luma32f().into_raw(),
        3 => image.to_rgb32f().into_raw(),
        4 => image.to_rgba32f().into_raw(),
        _ => {
            return Err(UNetError::InvalidConfiguration(format!(
                "images provide 1, 3 or 4 channels, got {channels}"
            )));
        }
    };

    Ok(Tensor::from_data(
        TensorData::new(
            to_planar(interleaved, channels),
            Shape::new([channels, height, width]),
        )
        .convert::<B::FloatElem>(),
        device,
    ))
}

/// Decodes a mask image into `[1, height, width]` class indices.
pub fn mask_to_tensor<B: Backend>(mask: &DynamicImage, device: &B::Device) -> Tensor<B, 3, Int> {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let values: Vec<i64> = mask.to_luma8().into_raw().into_iter().map(i64::from).collect();

    Tensor::from_data(
        TensorData::new(values, Shape::new([1, height, width])).convert::<B::IntElem>(),
        device,
    )
}

/// Normalizes one decoded image, cuts it (and its mask) into patches and writes
/// them to `images_dir` / `masks_dir`, named after the image's file stem.
///
/// Z-scored rasters are min-max rescaled before writing since PNG stores `[0, 1]`.
pub fn preprocess_file<B: Backend>(
    image_path: &Path,
    mask_path: Option<&Path>,
    normalization: &Normalization,
    config: &PatchConfig,
    images_dir: &Path,
    masks_dir: &Path,
    device: &B::Device,
) -> Result<Vec<PathBuf>, UNetError> {
    let stem = image_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| UNetError::Dataset(format!("No file stem in {image_path:?}")))?;

    let image = image::open(image_path)?;
    let channels = if image.color().has_color() { 3 } else { 1 };
    let raster = normalize(image_to_tensor::<B>(&image, channels, device)?, normalization);
    let raster = match normalization {
        Normalization::MinMax => raster,
        Normalization::ZScore => normalize(raster, &Normalization::MinMax),
    };

    let mask = match mask_path {
        Some(path) => Some(mask_to_tensor::<B>(&image::open(path)?, device)),
        None => None,
    };

    let patches = create_patches(raster, mask, config)?;
    save_patches(&patches, stem, images_dir, masks_dir)
}

/// Interleaved (`HWC`) pixel values to channel-major (`CHW`) order.
pub(crate) fn to_planar(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    let plane = interleaved.len() / channels;
    let mut planar = vec![0.0; interleaved.len()];
    for (index, value) in interleaved.into_iter().enumerate() {
        planar[(index % channels) * plane + index / channels] = value;
    }
    planar
}

fn to_byte(value: f32) -> u8 {
    (value + 0.5) as u8
}

pub(crate) fn mask_to_gray<B: Backend>(mask: Tensor<B, 3, Int>) -> Result<GrayImage, UNetError> {
    let [_, height, width] = mask.dims();
    let values = mask
        .clamp(0, 255)
        .into_data()
        .convert::<i32>()
        .to_vec::<i32>()
        .map_err(|e| UNetError::Dataset(format!("Unable to read mask values: {e:?}")))?;

    let bytes = values[..height * width].iter().map(|&v| v as u8).collect();
    to_gray(bytes, height, width)
}

pub(crate) fn to_gray(bytes: Vec<u8>, height: usize, width: usize) -> Result<GrayImage, UNetError> {
    GrayImage::from_raw(width as u32, height as u32, bytes)
        .ok_or_else(|| UNetError::Dataset(format!("Buffer does not hold a {height}x{width} image")))
}

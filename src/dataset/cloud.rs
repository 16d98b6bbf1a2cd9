use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::transform::{Mapper, MapperDataset, PartialDataset, ShuffledDataset};
use burn::data::dataset::{Dataset, InMemDataset};
use image::imageops::FilterType;

use crate::{error::UNetError, preprocess::to_planar};

use super::pairing::pair_files;

const SUPPORTED_FILES: [&str; 6] = ["bmp", "jpg", "jpeg", "png", "tif", "tiff"];

/// Paths of an image and its cloud mask.
#[derive(Debug, Clone)]
pub struct CloudItemRaw {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
}

/// A decoded image/mask pair.
///
/// `image` is channel-major (`[channels, height, width]`) with values in `[0, 1]`,
/// `mask` holds one class index per pixel. Both are empty when the pair could
/// not be decoded.
#[derive(Debug, Clone)]
pub struct CloudItem {
    pub image: Vec<f32>,
    pub channels: usize,
    pub mask: Vec<u8>,
    pub height: usize,
    pub width: usize,
}

impl CloudItem {
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

struct PathToCloudItem {
    image_size: Option<[usize; 2]>,
}

impl PathToCloudItem {
    fn load(&self, item: &CloudItemRaw) -> Result<CloudItem, UNetError> {
        let mut image = image::open(&item.image_path)?;
        let mut mask = image::open(&item.mask_path)?;

        if let Some([height, width]) = self.image_size {
            let (width, height) = (width as u32, height as u32);
            if (image.width(), image.height()) != (width, height) {
                image = image.resize_exact(width, height, FilterType::Triangle);
            }
            if (mask.width(), mask.height()) != (width, height) {
                mask = mask.resize_exact(width, height, FilterType::Nearest);
            }
        }

        if (image.width(), image.height()) != (mask.width(), mask.height()) {
            return Err(UNetError::Dataset(format!(
                "Image {:?} is {}x{} but mask {:?} is {}x{}",
                item.image_path,
                image.width(),
                image.height(),
                item.mask_path,
                mask.width(),
                mask.height()
            )));
        }

        let (width, height) = (image.width() as usize, image.height() as usize);
        let (channels, interleaved) = if image.color().has_color() {
            (3, image.to_rgb32f().into_raw())
        } else {
            (1, image.to_luma32f().into_raw())
        };

        Ok(CloudItem {
            image: to_planar(interleaved, channels),
            channels,
            mask: mask.into_luma8().into_raw(),
            height,
            width,
        })
    }
}

impl Mapper<CloudItemRaw, CloudItem> for PathToCloudItem {
    fn map(&self, item: &CloudItemRaw) -> CloudItem {
        self.load(item).unwrap_or_else(|e| {
            tracing::error!(
                "Error loading image {:?} with mask {:?}: {}",
                item.image_path,
                item.mask_path,
                e
            );
            CloudItem {
                image: Vec::new(),
                channels: 0,
                mask: Vec::new(),
                height: 0,
                width: 0,
            }
        })
    }
}

type CloudDatasetMapper = MapperDataset<InMemDataset<CloudItemRaw>, PathToCloudItem, CloudItemRaw>;

/// Image/mask pairs decoded lazily on access.
pub struct CloudDataset {
    dataset: CloudDatasetMapper,
}

impl Dataset<CloudItem> for CloudDataset {
    fn get(&self, index: usize) -> Option<CloudItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl CloudDataset {
    /// Create a dataset from explicit `(image, mask)` pairs.
    ///
    /// When `image_size` (`[height, width]`) is given, images and masks are resized
    /// to it while decoding.
    pub fn new_with_pairs<P: AsRef<Path>>(
        pairs: Vec<(P, P)>,
        image_size: Option<[usize; 2]>,
    ) -> Result<Self, UNetError> {
        let items = pairs
            .into_iter()
            .map(|(image_path, mask_path)| {
                let image_path = image_path.as_ref().to_path_buf();
                check_extension(&image_path)?;
                check_extension(mask_path.as_ref())?;

                Ok(CloudItemRaw {
                    image_path,
                    mask_path: mask_path.as_ref().to_path_buf(),
                })
            })
            .collect::<Result<Vec<_>, UNetError>>()?;

        tracing::info!("Dataset initialized with {} samples", items.len());

        let dataset = MapperDataset::new(InMemDataset::new(items), PathToCloudItem { image_size });
        Ok(Self { dataset })
    }

    /// Create a dataset from an images folder and a masks folder, pairing files
    /// with [pair_files].
    pub fn from_dirs<P: AsRef<Path>>(
        images_dir: P,
        masks_dir: P,
        image_size: Option<[usize; 2]>,
    ) -> Result<Self, UNetError> {
        let images = list_supported(images_dir.as_ref())?;
        let masks = list_supported(masks_dir.as_ref())?;

        let pairs = pair_files(images, masks);
        if pairs.is_empty() {
            return Err(UNetError::Dataset(format!(
                "No image/mask pairs found in {:?} and {:?}",
                images_dir.as_ref(),
                masks_dir.as_ref()
            )));
        }

        Self::new_with_pairs(pairs, image_size)
    }
}

fn list_supported(dir: &Path) -> Result<Vec<PathBuf>, UNetError> {
    if !dir.is_dir() {
        return Err(UNetError::Dataset(format!(
            "Directory does not exist: {dir:?}"
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_supported_extension(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_FILES
                .iter()
                .any(|&valid_ext| valid_ext.eq_ignore_ascii_case(ext))
        })
}

fn check_extension(path: &Path) -> Result<(), UNetError> {
    if has_supported_extension(path) {
        Ok(())
    } else {
        Err(UNetError::Dataset(format!(
            "Invalid file extension: {path:?}"
        )))
    }
}

pub type CloudSplit = PartialDataset<Arc<ShuffledDataset<CloudDataset, CloudItem>>, CloudItem>;

/// Shuffles `dataset` with `seed` and splits it into training and validation
/// parts, the latter holding `ceil(len * val_ratio)` items.
pub fn split(
    dataset: CloudDataset,
    val_ratio: f64,
    seed: u64,
) -> Result<(CloudSplit, CloudSplit), UNetError> {
    if !(0.0..1.0).contains(&val_ratio) {
        return Err(UNetError::InvalidConfiguration(format!(
            "Validation ratio must be in [0, 1), got {val_ratio}"
        )));
    }

    let shuffled = Arc::new(ShuffledDataset::with_seed(dataset, seed));
    let len = shuffled.len();
    let val_len = ((len as f64 * val_ratio).ceil() as usize).min(len.saturating_sub(1));
    let train_len = len - val_len;

    tracing::info!(
        "Training with {} samples, validating with {} samples",
        train_len,
        val_len
    );

    Ok((
        PartialDataset::new(shuffled.clone(), 0, train_len),
        PartialDataset::new(shuffled, train_len, len),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_pair(dir: &Path, index: usize, size: (u32, u32)) {
        let images = dir.join("images");
        let masks = dir.join("masks");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::create_dir_all(&masks).unwrap();

        RgbImage::from_fn(size.0, size.1, |x, _| Rgb([x as u8 * 10, index as u8, 255]))
            .save(images.join(format!("scene_patch_{index}.png")))
            .unwrap();
        GrayImage::from_fn(size.0, size.1, |x, _| Luma([(x % 2) as u8]))
            .save(masks.join(format!("scene_mask_{index}.png")))
            .unwrap();
    }

    #[test]
    fn loads_pairs_from_folders() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), 0, (4, 2));
        write_pair(dir.path(), 1, (4, 2));

        let dataset =
            CloudDataset::from_dirs(dir.path().join("images"), dir.path().join("masks"), None)
                .unwrap();
        assert_eq!(dataset.len(), 2);

        let item = dataset.get(0).unwrap();
        assert_eq!((item.channels, item.height, item.width), (3, 2, 4));
        assert_eq!(item.image.len(), 3 * 2 * 4);
        // Red channel plane first, blue plane last.
        assert!((item.image[1] - 10.0 / 255.0).abs() < 1e-6);
        assert!((item.image[2 * 8] - 1.0).abs() < 1e-6);
        assert_eq!(item.mask, vec![0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn grayscale_images_load_as_one_channel() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("scene_patch_0.png");
        let mask_path = dir.path().join("scene_mask_0.png");
        GrayImage::from_fn(3, 1, |x, _| Luma([x as u8 * 51]))
            .save(&image_path)
            .unwrap();
        GrayImage::from_pixel(3, 1, Luma([1])).save(&mask_path).unwrap();

        let dataset = CloudDataset::new_with_pairs(vec![(image_path, mask_path)], None).unwrap();

        let item = dataset.get(0).unwrap();
        assert_eq!((item.channels, item.height, item.width), (1, 1, 3));
        assert!((item.image[2] - 102.0 / 255.0).abs() < 1e-6);
        assert_eq!(item.mask, vec![1, 1, 1]);
    }

    #[test]
    fn resizes_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), 0, (8, 6));

        let dataset = CloudDataset::from_dirs(
            dir.path().join("images"),
            dir.path().join("masks"),
            Some([3, 4]),
        )
        .unwrap();

        let item = dataset.get(0).unwrap();
        assert_eq!((item.height, item.width), (3, 4));
        assert_eq!(item.mask.len(), 12);
    }

    #[test]
    fn unreadable_pair_yields_empty_item() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = CloudDataset::new_with_pairs(
            vec![(dir.path().join("missing.png"), dir.path().join("missing_mask.png"))],
            None,
        )
        .unwrap();

        assert!(dataset.get(0).unwrap().is_empty());
    }

    #[test]
    fn empty_folders_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::create_dir_all(dir.path().join("masks")).unwrap();

        let result =
            CloudDataset::from_dirs(dir.path().join("images"), dir.path().join("masks"), None);
        assert!(matches!(result, Err(UNetError::Dataset(_))));
    }

    #[test]
    fn rejects_unsupported_extensions() {
        let result = CloudDataset::new_with_pairs(vec![("a.npy", "a_mask.png")], None);
        assert!(matches!(result, Err(UNetError::Dataset(_))));
    }

    #[test]
    fn split_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..10 {
            write_pair(dir.path(), index, (2, 2));
        }
        let load = || {
            CloudDataset::from_dirs(dir.path().join("images"), dir.path().join("masks"), None)
                .unwrap()
        };

        let (train, valid) = split(load(), 0.2, 42).unwrap();
        assert_eq!((train.len(), valid.len()), (8, 2));

        let (_, valid_again) = split(load(), 0.2, 42).unwrap();
        let images = |dataset: &CloudSplit| -> Vec<Vec<f32>> {
            dataset.iter().map(|item| item.image).collect()
        };
        assert_eq!(images(&valid), images(&valid_again));

        assert!(split(load(), 1.0, 42).is_err());
    }
}

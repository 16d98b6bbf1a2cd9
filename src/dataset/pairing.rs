use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Markers stripped from image stems before matching them with masks.
const IMAGE_MARKERS: [&str; 2] = ["_patch_", "_img_"];
/// Markers stripped from mask stems.
const MASK_MARKERS: [&str; 1] = ["_mask_"];

/// Pairs image files with mask files.
///
/// Equal counts are paired in sorted order. Otherwise both sides are keyed by
/// their stem with the patch/image/mask markers removed (`scene_patch_3` and
/// `scene_mask_3` both become `scene3`) and only keys present on both sides are
/// kept, in key order.
pub fn pair_files(mut images: Vec<PathBuf>, mut masks: Vec<PathBuf>) -> Vec<(PathBuf, PathBuf)> {
    images.sort();
    masks.sort();

    if images.len() == masks.len() {
        return images.into_iter().zip(masks).collect();
    }

    tracing::warn!(
        "Found {} images but {} masks, matching them by name",
        images.len(),
        masks.len()
    );

    let image_keys: BTreeMap<String, PathBuf> = images
        .into_iter()
        .filter_map(|path| Some((pairing_key(&path, &IMAGE_MARKERS)?, path)))
        .collect();
    let mut mask_keys: BTreeMap<String, PathBuf> = masks
        .into_iter()
        .filter_map(|path| Some((pairing_key(&path, &MASK_MARKERS)?, path)))
        .collect();

    let pairs: Vec<(PathBuf, PathBuf)> = image_keys
        .into_iter()
        .filter_map(|(key, image)| mask_keys.remove(&key).map(|mask| (image, mask)))
        .collect();

    tracing::info!("Found {} common image/mask pairs", pairs.len());
    pairs
}

pub fn pairing_key(path: &Path, markers: &[&str]) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();

    Some(
        markers
            .iter()
            .fold(stem, |stem, marker| stem.replace(marker, "")),
    )
}

//! Loading scan/label pairs from disk into a [`VoxelDataset`].
//!
//! Scans are DICOM series, one series per directory. Labels are MetaImage
//! files (`.mhd` or `.mha`). Pairs are matched by sorted path order.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use volseg_core::mask::{binarize, foreground_fraction};
use volseg_core::RegionOfInterest;
use volseg_io::{find_directories_with, find_files, read_dicom_series, read_metaimage};

use crate::data::{VoxelDataset, VoxelSample};
use crate::error::{Result, TrainingError};

/// Extensions recognized as label files.
pub const LABEL_EXTENSIONS: [&str; 2] = ["mhd", "mha"];

/// Default training region, `z0,y0,x0,dz,dy,dx`: slices 70..134 and the
/// in-plane block 128..192 on both rows and columns.
pub const DEFAULT_REGION: &str = "70,128,128,64,64,64";

/// A scan directory and its label file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    pub scan_dir: PathBuf,
    pub label_path: PathBuf,
}

/// Pair every DICOM series directory below `dicom_root` with a label file
/// below `label_root`, both in sorted path order.
pub fn discover_pairs<P: AsRef<Path>, Q: AsRef<Path>>(dicom_root: P, label_root: Q) -> Result<Vec<SamplePaths>> {
    let scans = find_directories_with(dicom_root, "dcm")?;

    let mut labels = Vec::new();
    for ext in LABEL_EXTENSIONS {
        labels.extend(find_files(label_root.as_ref(), ext)?);
    }
    labels.sort();

    if scans.is_empty() && labels.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    if scans.len() != labels.len() {
        return Err(TrainingError::invalid_configuration(format!(
            "found {} scan series but {} label files",
            scans.len(),
            labels.len()
        )));
    }

    Ok(scans
        .into_iter()
        .zip(labels)
        .map(|(scan_dir, label_path)| SamplePaths { scan_dir, label_path })
        .collect())
}

/// Load one scan and its label, crop both to `region` and binarize the label.
pub fn load_sample<B: Backend>(
    paths: &SamplePaths,
    region: &RegionOfInterest,
    device: &B::Device,
) -> Result<VoxelSample<B>> {
    let scan = read_dicom_series::<B, _>(&paths.scan_dir, device)?;
    let label = read_metaimage::<B, _>(&paths.label_path, device)?;

    if scan.shape() != label.shape() {
        return Err(TrainingError::ShapeMismatch {
            expected: scan.shape().to_vec(),
            actual: label.shape().to_vec(),
        });
    }

    let input = scan.crop(region)?;
    let label = binarize(&label.crop(region)?);
    tracing::debug!(
        shape = ?input.shape(),
        foreground = foreground_fraction(&label),
        "Loaded sample"
    );

    VoxelSample::new(input, label)
}

/// Load every pair into one dataset.
pub fn load_dataset<B: Backend>(
    pairs: &[SamplePaths],
    region: &RegionOfInterest,
    device: &B::Device,
) -> Result<VoxelDataset<B>> {
    let mut dataset = VoxelDataset::new();
    for (i, paths) in pairs.iter().enumerate() {
        dataset.push(load_sample(paths, region, device)?)?;
        tracing::info!("Loaded sample {}/{}", i + 1, pairs.len());
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_pairs_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let scans = temp.path().join("scans");
        let labels = temp.path().join("labels");
        touch(&scans.join("p2").join("s1.dcm"));
        touch(&scans.join("p1").join("s1.dcm"));
        touch(&scans.join("p1").join("s2.dcm"));
        touch(&labels.join("p1.mhd"));
        touch(&labels.join("p1.raw"));
        touch(&labels.join("p2.mha"));

        let pairs = discover_pairs(&scans, &labels).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].scan_dir, scans.join("p1"));
        assert_eq!(pairs[0].label_path, labels.join("p1.mhd"));
        assert_eq!(pairs[1].scan_dir, scans.join("p2"));
        assert_eq!(pairs[1].label_path, labels.join("p2.mha"));
    }

    #[test]
    fn test_discover_pairs_count_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        touch(&temp.path().join("scans").join("p1").join("s1.dcm"));
        fs::create_dir_all(temp.path().join("labels")).unwrap();

        let result = discover_pairs(temp.path().join("scans"), temp.path().join("labels"));
        assert!(matches!(result, Err(TrainingError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_default_region_is_slice_axis_first() {
        let region: RegionOfInterest = DEFAULT_REGION.parse().unwrap();
        assert_eq!(region.start, [70, 128, 128]);
        assert_eq!(region.end().unwrap(), [134, 192, 192]);
        assert!(region.fits([134, 512, 512]));
        assert!(!region.fits([512, 512, 133]));
    }

    #[test]
    fn test_discover_pairs_empty() {
        let temp = tempfile::tempdir().unwrap();
        let result = discover_pairs(temp.path(), temp.path());
        assert!(matches!(result, Err(TrainingError::EmptyDataset)));
    }
}

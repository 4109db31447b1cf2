//! File index and image dataset for decision-map fusion training

use std::fmt;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info, instrument, warn};

use super::{DataError, Dataset, FusionSample};
use crate::training::config::{ColorMode, DataConfig};

/// Dataset split directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// `train/`
    Train,
    /// `validate/`
    Validate,
}

impl Split {
    /// Directory name under the dataset root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validate => "validate",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One of the four aligned image directories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    SourceA,
    SourceB,
    GroundTruth,
    DecisionMap,
}

impl Modality {
    /// All modalities in loading order
    pub const ALL: [Modality; 4] = [
        Modality::SourceA,
        Modality::SourceB,
        Modality::GroundTruth,
        Modality::DecisionMap,
    ];

    /// Directory name under the split directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Modality::SourceA => "sourceA",
            Modality::SourceB => "sourceB",
            Modality::GroundTruth => "groundtruth",
            Modality::DecisionMap => "decisionmap",
        }
    }
}

/// Sorted, truncated file lists for the four modalities of one split
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    pub source_a: Vec<PathBuf>,
    pub source_b: Vec<PathBuf>,
    pub ground_truth: Vec<PathBuf>,
    pub decision_map: Vec<PathBuf>,
}

impl FileIndex {
    /// List `root/<split>/<modality>/*.*` for every modality
    ///
    /// Each list is sorted lexicographically and truncated to `limit`. A
    /// missing directory yields an empty list.
    #[instrument(skip(root))]
    pub fn scan(root: &Path, split: Split, limit: usize) -> Result<Self, DataError> {
        let split_dir = root.join(split.dir_name());
        let mut lists = Vec::with_capacity(4);
        for modality in Modality::ALL {
            let mut files = list_files(&split_dir.join(modality.dir_name()))?;
            files.sort();
            files.truncate(limit);
            debug!("{} {}: {} files", split, modality.dir_name(), files.len());
            lists.push(files);
        }

        let decision_map = lists.pop().unwrap_or_default();
        let ground_truth = lists.pop().unwrap_or_default();
        let source_b = lists.pop().unwrap_or_default();
        let source_a = lists.pop().unwrap_or_default();

        Ok(Self {
            source_a,
            source_b,
            ground_truth,
            decision_map,
        })
    }

    /// File list of a modality
    pub fn files(&self, modality: Modality) -> &[PathBuf] {
        match modality {
            Modality::SourceA => &self.source_a,
            Modality::SourceB => &self.source_b,
            Modality::GroundTruth => &self.ground_truth,
            Modality::DecisionMap => &self.decision_map,
        }
    }

    /// Number of positionally complete samples
    pub fn paired_len(&self) -> usize {
        Modality::ALL
            .iter()
            .map(|m| self.files(*m).len())
            .min()
            .unwrap_or(0)
    }

    /// Describe the first alignment problem, if any
    ///
    /// Checks that all lists have the same length and that files at the same
    /// position share a file stem.
    pub fn misalignment(&self) -> Option<String> {
        let lens: Vec<usize> = Modality::ALL.iter().map(|m| self.files(*m).len()).collect();
        if lens.iter().any(|&l| l != lens[0]) {
            return Some(format!(
                "modality sizes differ (sourceA={}, sourceB={}, groundtruth={}, decisionmap={})",
                lens[0], lens[1], lens[2], lens[3]
            ));
        }

        for i in 0..self.paired_len() {
            let stems: Vec<Option<&std::ffi::OsStr>> = Modality::ALL
                .iter()
                .map(|m| self.files(*m)[i].file_stem())
                .collect();
            if stems.iter().any(|s| *s != stems[0]) {
                return Some(format!(
                    "file stems differ at position {}: {:?}",
                    i,
                    Modality::ALL
                        .iter()
                        .map(|m| self.files(*m)[i].display().to_string())
                        .collect::<Vec<_>>()
                ));
            }
        }

        None
    }
}

/// Regular, non-hidden files whose name contains a dot
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| !n.starts_with('.') && n.contains('.'));
        if matches && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Aligned image dataset decoded on access
pub struct FusionDataset {
    index: FileIndex,
    len: usize,
    color: ColorMode,
    resize: Option<[u32; 2]>,
    device: Device,
}

impl FusionDataset {
    /// Create a dataset over a file index
    ///
    /// Samples are paired by sorted position. Misalignment is logged, or
    /// rejected when `strict_pairing` is set.
    pub fn new(
        index: FileIndex,
        split: Split,
        config: &DataConfig,
        device: Device,
    ) -> Result<Self, DataError> {
        if let Some(reason) = index.misalignment() {
            if config.strict_pairing {
                return Err(DataError::Misaligned {
                    split: split.to_string(),
                    reason,
                });
            }
            warn!("Positional pairing of {} data may be wrong: {}", split, reason);
        }

        let len = index.paired_len();
        info!("Loaded {} dataset with {} samples", split, len);

        Ok(Self {
            index,
            len,
            color: config.color,
            resize: config.resize,
            device,
        })
    }

    fn load_image(&self, path: &Path, channels: ColorMode) -> Result<Tensor, DataError> {
        let img = image::open(path).map_err(|source| DataError::Image {
            path: path.display().to_string(),
            source,
        })?;
        image_to_tensor(img, channels, self.resize, &self.device)
    }
}

impl Dataset for FusionDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<FusionSample, DataError> {
        if index >= self.len {
            return Err(DataError::InvalidIndex {
                index,
                dataset_size: self.len,
            });
        }

        Ok(FusionSample {
            source_a: self.load_image(&self.index.source_a[index], self.color)?,
            source_b: self.load_image(&self.index.source_b[index], self.color)?,
            ground_truth: self.load_image(&self.index.ground_truth[index], self.color)?,
            decision_map: self.load_image(&self.index.decision_map[index], ColorMode::Gray)?,
        })
    }
}

/// Convert an image into a `[C, H, W]` f32 tensor scaled to `[0, 1]`
pub fn image_to_tensor(
    img: DynamicImage,
    color: ColorMode,
    resize: Option<[u32; 2]>,
    device: &Device,
) -> Result<Tensor, DataError> {
    let img = match resize {
        Some([w, h]) if img.width() != w || img.height() != h => {
            img.resize_exact(w, h, FilterType::Triangle)
        }
        _ => img,
    };

    let (width, height) = (img.width() as usize, img.height() as usize);
    let channels = color.channels();
    let raw: Vec<u8> = match color {
        ColorMode::Gray => img.to_luma8().into_raw(),
        ColorMode::Rgb => img.to_rgb8().into_raw(),
    };

    let data: Vec<f32> = raw.into_iter().map(|p| p as f32 / 255.0).collect();
    let tensor = Tensor::from_vec(data, (height, width, channels), device)?
        .permute((2, 0, 1))?
        .contiguous()?;
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_split(root: &Path, split: Split, names: &[&str]) {
        for modality in Modality::ALL {
            let dir = root.join(split.dir_name()).join(modality.dir_name());
            std::fs::create_dir_all(&dir).unwrap();
            for name in names {
                GrayImage::from_pixel(4, 4, Luma([128])).save(dir.join(name)).unwrap();
            }
        }
    }

    #[test]
    fn test_scan_sorts_and_truncates() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Train, &["c.png", "a.png", "d.png", "b.png"]);

        let index = FileIndex::scan(dir.path(), Split::Train, 3).unwrap();
        for modality in Modality::ALL {
            let names: Vec<String> = index
                .files(modality)
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
        }
        assert!(index.misalignment().is_none());
    }

    #[test]
    fn test_scan_changes_with_names() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Train, &["b.png", "c.png"]);
        let before = FileIndex::scan(dir.path(), Split::Train, 1).unwrap();

        write_split(dir.path(), Split::Train, &["a.png"]);
        let after = FileIndex::scan(dir.path(), Split::Train, 1).unwrap();

        assert!(before.source_a[0].ends_with("b.png"));
        assert!(after.source_a[0].ends_with("a.png"));
    }

    #[test]
    fn test_scan_ignores_files_without_extension() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Validate, &["x.png"]);
        let a_dir = dir.path().join("validate").join("sourceA");
        std::fs::write(a_dir.join("README"), b"notes").unwrap();
        std::fs::create_dir_all(a_dir.join("nested.dir")).unwrap();

        let index = FileIndex::scan(dir.path(), Split::Validate, 10).unwrap();
        assert_eq!(index.source_a.len(), 1);
    }

    #[test]
    fn test_scan_skips_hidden_files() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Train, &["001.png"]);
        for modality in Modality::ALL {
            let modality_dir = dir.path().join("train").join(modality.dir_name());
            std::fs::write(modality_dir.join(".DS_Store"), b"junk").unwrap();
            std::fs::write(modality_dir.join("._001.png"), b"junk").unwrap();
        }

        let index = FileIndex::scan(dir.path(), Split::Train, 1).unwrap();
        assert_eq!(index.paired_len(), 1);
        assert!(index.source_a[0].ends_with("001.png"));
        assert!(index.misalignment().is_none());

        let dataset =
            FusionDataset::new(index, Split::Train, &DataConfig::default(), Device::Cpu).unwrap();
        assert!(dataset.get(0).is_ok());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::scan(dir.path(), Split::Train, 10).unwrap();
        assert_eq!(index.paired_len(), 0);

        let dataset =
            FusionDataset::new(index, Split::Train, &DataConfig::default(), Device::Cpu).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_misaligned_stems() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Train, &["1.png"]);
        let gt_dir = dir.path().join("train").join("groundtruth");
        std::fs::remove_file(gt_dir.join("1.png")).unwrap();
        GrayImage::from_pixel(4, 4, Luma([0])).save(gt_dir.join("2.png")).unwrap();

        let index = FileIndex::scan(dir.path(), Split::Train, 10).unwrap();
        assert!(index.misalignment().unwrap().contains("stems"));

        let lenient = DataConfig::default();
        assert!(FusionDataset::new(index.clone(), Split::Train, &lenient, Device::Cpu).is_ok());

        let strict = DataConfig {
            strict_pairing: true,
            ..DataConfig::default()
        };
        let err = FusionDataset::new(index, Split::Train, &strict, Device::Cpu).err().unwrap();
        assert!(matches!(err, DataError::Misaligned { .. }));
    }

    #[test]
    fn test_uneven_lists_use_shortest() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), Split::Train, &["1.png", "2.png"]);
        std::fs::remove_file(dir.path().join("train").join("decisionmap").join("2.png")).unwrap();

        let index = FileIndex::scan(dir.path(), Split::Train, 10).unwrap();
        assert!(index.misalignment().unwrap().contains("sizes differ"));
        let dataset =
            FusionDataset::new(index, Split::Train, &DataConfig::default(), Device::Cpu).unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(matches!(dataset.get(1), Err(DataError::InvalidIndex { .. })));
    }

    #[test]
    fn test_image_to_tensor_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 0, 51]));
        let tensor =
            image_to_tensor(DynamicImage::ImageRgb8(img), ColorMode::Rgb, None, &Device::Cpu)
                .unwrap();
        assert_eq!(tensor.dims(), &[3, 2, 3]);

        let values = tensor.to_vec3::<f32>().unwrap();
        assert_eq!(values[0][1][2], 1.0);
        assert_eq!(values[1][1][2], 0.0);
        assert!((values[2][1][2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_image_to_tensor_resize_gray() {
        let img = RgbImage::from_pixel(8, 6, Rgb([255, 255, 255]));
        let tensor = image_to_tensor(
            DynamicImage::ImageRgb8(img),
            ColorMode::Gray,
            Some([4, 3]),
            &Device::Cpu,
        )
        .unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 4]);
    }
}

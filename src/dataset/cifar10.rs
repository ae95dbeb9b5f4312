//! CIFAR-10 binary loader
//!
//! Reads the `cifar-10-batches-bin` distribution: five training batches and
//! one test batch of fixed-size records. Each record is a label byte followed
//! by the red, green and blue planes of a 32x32 image.
//!
//! Subsets are selected with slice notation such as `train[:800]` or
//! `test[100:200]`; only the batch files needed to cover a slice are read.

use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::utils::error::{CifarError, Result};

/// CIFAR-10 class names, indexed by label
pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Native CIFAR-10 side length
pub const IMAGE_SIDE: u32 = 32;

const PLANE_SIZE: usize = (IMAGE_SIDE * IMAGE_SIDE) as usize;
const RECORD_SIZE: usize = 1 + 3 * PLANE_SIZE;

/// Get the class name for a label
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASS_NAMES.get(label).copied()
}

/// Single labelled CIFAR-10 image
#[derive(Debug, Clone)]
pub struct Cifar10Image {
    pub data: RgbImage,
    /// Class label (0-9)
    pub label: usize,
}

impl Cifar10Image {
    pub fn class_name(&self) -> &'static str {
        class_name(self.label).unwrap_or("unknown")
    }
}

/// Which half of CIFAR-10 to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Batch files making up this split, in order
    pub fn file_names(&self) -> Vec<String> {
        match self {
            Split::Train => (1..=5).map(|i| format!("data_batch_{}.bin", i)).collect(),
            Split::Test => vec!["test_batch.bin".to_string()],
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = CifarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(CifarError::InvalidSlice(
                other.to_string(),
                "split must be 'train' or 'test'".to_string(),
            )),
        }
    }
}

/// A contiguous selection of a split, e.g. `train[:800]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSlice {
    pub split: Split,
    pub start: usize,
    /// Exclusive end; `None` runs to the end of the split
    pub end: Option<usize>,
}

impl DatasetSlice {
    /// The whole split
    pub fn full(split: Split) -> Self {
        Self {
            split,
            start: 0,
            end: None,
        }
    }

    /// Resolve against a split of `len` records, clamping both bounds
    pub fn range(&self, len: usize) -> Range<usize> {
        let end = self.end.unwrap_or(len).min(len);
        let start = self.start.min(end);
        start..end
    }
}

impl fmt::Display for DatasetSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (0, None) => write!(f, "{}", self.split),
            (0, Some(end)) => write!(f, "{}[:{}]", self.split, end),
            (start, None) => write!(f, "{}[{}:]", self.split, start),
            (start, Some(end)) => write!(f, "{}[{}:{}]", self.split, start, end),
        }
    }
}

impl FromStr for DatasetSlice {
    type Err = CifarError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| CifarError::InvalidSlice(s.to_string(), reason.to_string());

        let Some(open) = s.find('[') else {
            return Ok(Self::full(s.parse()?));
        };

        let split: Split = s[..open].parse()?;
        let inner = s[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| invalid("missing closing ']'"))?;
        let (start, end) = inner
            .split_once(':')
            .ok_or_else(|| invalid("expected 'start:end' inside brackets"))?;

        let parse_bound = |bound: &str| -> Result<Option<usize>> {
            let bound = bound.trim();
            if bound.is_empty() {
                Ok(None)
            } else {
                bound
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| invalid("bounds must be non-negative integers"))
            }
        };

        let start = parse_bound(start)?.unwrap_or(0);
        let end = parse_bound(end)?;
        if let Some(end) = end {
            if start > end {
                return Err(invalid("start is greater than end"));
            }
        }

        Ok(Self { split, start, end })
    }
}

/// A loaded (possibly partial) CIFAR-10 split
#[derive(Debug, Clone)]
pub struct Cifar10Dataset {
    pub images: Vec<Cifar10Image>,
    pub split: Split,
}

impl Cifar10Dataset {
    /// Load an entire split from `data_dir`
    pub fn load(data_dir: impl AsRef<Path>, split: Split) -> Result<Self> {
        Self::load_slice(data_dir, &DatasetSlice::full(split))
    }

    /// Load the records selected by `slice`
    pub fn load_slice(data_dir: impl AsRef<Path>, slice: &DatasetSlice) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.is_dir() {
            return Err(CifarError::Dataset(format!(
                "CIFAR-10 directory not found: {:?} (expected the extracted cifar-10-batches-bin)",
                data_dir
            )));
        }

        let files: Vec<PathBuf> = slice
            .split
            .file_names()
            .into_iter()
            .map(|name| data_dir.join(name))
            .collect();

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut images = Vec::new();
        for path in &files {
            if let Some(end) = slice.end {
                if images.len() >= end {
                    break;
                }
            }
            pb.set_message(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            let batch = read_batch_file(path)?;
            debug!("Read {} records from {:?}", batch.len(), path);
            images.extend(batch);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let range = slice.range(images.len());
        let images: Vec<Cifar10Image> = images.drain(range).collect();
        info!("Loaded {} images for {}", images.len(), slice);

        Ok(Self {
            images,
            split: slice.split,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cifar10Image> {
        self.images.get(index)
    }

    /// Number of images per class
    pub fn class_distribution(&self) -> [usize; 10] {
        let mut counts = [0; 10];
        for img in &self.images {
            counts[img.label] += 1;
        }
        counts
    }
}

/// Read every record of one batch file
pub fn read_batch_file(path: &Path) -> Result<Vec<Cifar10Image>> {
    let buffer = fs::read(path)
        .map_err(|e| CifarError::BatchFile(path.to_path_buf(), e.to_string()))?;
    decode_records(&buffer).map_err(|reason| CifarError::BatchFile(path.to_path_buf(), reason))
}

fn decode_records(buffer: &[u8]) -> std::result::Result<Vec<Cifar10Image>, String> {
    if buffer.is_empty() || buffer.len() % RECORD_SIZE != 0 {
        return Err(format!(
            "size {} is not a positive multiple of the {}-byte record",
            buffer.len(),
            RECORD_SIZE
        ));
    }

    buffer
        .chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(index, record)| {
            let label = record[0] as usize;
            if label >= CLASS_NAMES.len() {
                return Err(format!("record {} has label {} (expected 0-9)", index, label));
            }

            let (red, rest) = record[1..].split_at(PLANE_SIZE);
            let (green, blue) = rest.split_at(PLANE_SIZE);
            let data = RgbImage::from_fn(IMAGE_SIDE, IMAGE_SIDE, |x, y| {
                let i = (y * IMAGE_SIDE + x) as usize;
                image::Rgb([red[i], green[i], blue[i]])
            });

            Ok(Cifar10Image { data, label })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode one record in the on-disk layout
    pub(crate) fn encode_record(label: u8, image: &RgbImage) -> Vec<u8> {
        let mut record = vec![label];
        for channel in 0..3 {
            record.extend(image.pixels().map(|p| p[channel]));
        }
        record
    }

    /// Image whose pixels encode their position and label
    pub(crate) fn pattern_image(label: u8) -> RgbImage {
        RgbImage::from_fn(IMAGE_SIDE, IMAGE_SIDE, |x, y| {
            image::Rgb([x as u8, y as u8, label.wrapping_mul(20)])
        })
    }

    /// Write a fake `cifar-10-batches-bin` with `per_file` records per batch file
    pub(crate) fn write_fake_dataset(dir: &Path, per_file: usize) {
        for split in [Split::Train, Split::Test] {
            for (file_idx, name) in split.file_names().iter().enumerate() {
                let mut bytes = Vec::new();
                for i in 0..per_file {
                    let label = ((file_idx * per_file + i) % 10) as u8;
                    bytes.extend(encode_record(label, &pattern_image(label)));
                }
                fs::write(dir.join(name), bytes).unwrap();
            }
        }
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(0), Some("airplane"));
        assert_eq!(class_name(9), Some("truck"));
        assert_eq!(class_name(10), None);
    }

    #[test]
    fn test_decode_planes() {
        let image = pattern_image(3);
        let records = decode_records(&encode_record(3, &image)).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, 3);
        assert_eq!(records[0].class_name(), "cat");
        assert_eq!(records[0].data.get_pixel(5, 17).0, [5, 17, 60]);
        assert_eq!(records[0].data, image);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let mut bytes = encode_record(1, &pattern_image(1));
        bytes.pop();
        assert!(decode_records(&bytes).is_err());
        assert!(decode_records(&[]).is_err());
    }

    #[test]
    fn test_bad_label_rejected() {
        let bytes = encode_record(12, &pattern_image(0));
        let err = decode_records(&bytes).unwrap_err();
        assert!(err.contains("label 12"));
    }

    #[test]
    fn test_slice_parsing() {
        let slice: DatasetSlice = "train[:800]".parse().unwrap();
        assert_eq!(slice, DatasetSlice { split: Split::Train, start: 0, end: Some(800) });

        let slice: DatasetSlice = "test[10:20]".parse().unwrap();
        assert_eq!((slice.split, slice.start, slice.end), (Split::Test, 10, Some(20)));

        let slice: DatasetSlice = "train[5:]".parse().unwrap();
        assert_eq!((slice.start, slice.end), (5, None));

        let slice: DatasetSlice = " test ".parse().unwrap();
        assert_eq!(slice, DatasetSlice::full(Split::Test));
    }

    #[test]
    fn test_invalid_slices_rejected() {
        for bad in ["valid", "train[", "train[10]", "train[-1:5]", "test[20:10]", "train[a:b]", "[:5]"] {
            let result = bad.parse::<DatasetSlice>();
            assert!(result.is_err(), "{} was accepted", bad);
        }
    }

    #[test]
    fn test_slice_display_roundtrip() {
        for text in ["train", "test[:200]", "train[5:]", "train[10:20]"] {
            let slice: DatasetSlice = text.parse().unwrap();
            assert_eq!(slice.to_string(), text);
        }
    }

    #[test]
    fn test_slice_range_clamped() {
        let slice: DatasetSlice = "train[40:800]".parse().unwrap();
        assert_eq!(slice.range(100), 40..100);
        assert_eq!(slice.range(10), 10..10);
    }

    #[test]
    fn test_load_slice_reads_only_needed_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 4);
        // Corrupt the last training file; a short slice must not touch it
        fs::write(dir.path().join("data_batch_5.bin"), b"junk").unwrap();

        let slice: DatasetSlice = "train[2:6]".parse().unwrap();
        let dataset = Cifar10Dataset::load_slice(dir.path(), &slice).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.images[0].label, 2);

        let full = Cifar10Dataset::load(dir.path(), Split::Train);
        assert!(matches!(full, Err(CifarError::BatchFile(_, _))));
    }

    #[test]
    fn test_load_test_split_and_distribution() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 20);

        let dataset = Cifar10Dataset::load(dir.path(), Split::Test).unwrap();
        assert_eq!(dataset.len(), 20);
        assert_eq!(dataset.class_distribution(), [2; 10]);

        let clamped: DatasetSlice = "test[:500]".parse().unwrap();
        assert_eq!(Cifar10Dataset::load_slice(dir.path(), &clamped).unwrap().len(), 20);
    }

    #[test]
    fn test_missing_directory() {
        let result = Cifar10Dataset::load("/nonexistent/cifar", Split::Train);
        assert!(matches!(result, Err(CifarError::Dataset(_))));
    }
}

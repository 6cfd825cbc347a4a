//! Readers for the binary versions of CIFAR-10 and CIFAR-100.
//!
//! Every record is a run of label bytes followed by `3 * 32 * 32` pixel bytes, channel major.
//! CIFAR-10 records carry one label byte, CIFAR-100 records carry the coarse label and then the
//! fine one, which is the one used.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use super::{ImageDim, InMemoryDataset};
use crate::{
    config::DatasetKind,
    error::{Result, TrainerErr},
};

pub const IMAGE_DIM: ImageDim = (3, 32, 32);

const CIFAR10_DIR: &str = "cifar-10-batches-bin";
const CIFAR100_DIR: &str = "cifar-100-binary";

/// Which part of a dataset to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// The layout of one dataset's records.
#[derive(Debug, Clone, Copy)]
struct RecordFormat {
    label_bytes: usize,
    label_offset: usize,
    num_classes: usize,
}

impl RecordFormat {
    fn of(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Cifar10 => Self {
                label_bytes: 1,
                label_offset: 0,
                num_classes: 10,
            },
            DatasetKind::Cifar100 => Self {
                label_bytes: 2,
                label_offset: 1,
                num_classes: 100,
            },
        }
    }

    fn record_len(&self) -> usize {
        self.label_bytes + IMAGE_DIM.0 * IMAGE_DIM.1 * IMAGE_DIM.2
    }
}

/// Lists the files of a split under `data_dir`.
pub fn files(kind: DatasetKind, data_dir: &Path, split: Split) -> Vec<PathBuf> {
    match (kind, split) {
        (DatasetKind::Cifar10, Split::Train) => (1..=5)
            .map(|i| data_dir.join(CIFAR10_DIR).join(format!("data_batch_{i}.bin")))
            .collect(),
        (DatasetKind::Cifar10, Split::Test) => {
            vec![data_dir.join(CIFAR10_DIR).join("test_batch.bin")]
        }
        (DatasetKind::Cifar100, Split::Train) => vec![data_dir.join(CIFAR100_DIR).join("train.bin")],
        (DatasetKind::Cifar100, Split::Test) => vec![data_dir.join(CIFAR100_DIR).join("test.bin")],
    }
}

/// Reads a whole split into memory, pixels scaled to `[0, 1]`.
pub fn load(kind: DatasetKind, data_dir: &Path, split: Split) -> Result<InMemoryDataset> {
    let format = RecordFormat::of(kind);
    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for path in files(kind, data_dir, split) {
        let bytes = fs::read(&path)?;
        parse_records(&bytes, format, &mut pixels, &mut labels)
            .map_err(|msg| TrainerErr::Dataset { path, msg })?;
    }

    info!("loaded {} {kind} {split:?} images", labels.len());
    InMemoryDataset::new(IMAGE_DIM, pixels, labels)
}

fn parse_records(
    bytes: &[u8],
    format: RecordFormat,
    pixels: &mut Vec<f32>,
    labels: &mut Vec<usize>,
) -> std::result::Result<(), String> {
    let record_len = format.record_len();

    if bytes.is_empty() || bytes.len() % record_len != 0 {
        return Err(format!(
            "{} bytes is not a whole amount of {record_len} byte records",
            bytes.len()
        ));
    }

    pixels.reserve(bytes.len() / record_len * (record_len - format.label_bytes));

    for (i, record) in bytes.chunks_exact(record_len).enumerate() {
        let label = record[format.label_offset] as usize;

        if label >= format.num_classes {
            return Err(format!("record {i} has label {label}"));
        }

        labels.push(label);
        pixels.extend(
            record[format.label_bytes..]
                .iter()
                .map(|&p| p as f32 / 255.),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &[u8], pixel: u8) -> Vec<u8> {
        let mut record = labels.to_vec();
        record.extend(std::iter::repeat_n(pixel, 3 * 32 * 32));
        record
    }

    fn decode(kind: DatasetKind, bytes: &[u8]) -> std::result::Result<InMemoryDataset, String> {
        let mut pixels = Vec::new();
        let mut labels = Vec::new();

        parse_records(bytes, RecordFormat::of(kind), &mut pixels, &mut labels)?;
        InMemoryDataset::new(IMAGE_DIM, pixels, labels).map_err(|e| e.to_string())
    }

    #[test]
    fn cifar10_records() {
        let bytes = [record(&[3], 255), record(&[7], 0)].concat();
        let ds = decode(DatasetKind::Cifar10, &bytes).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.labels(), [3, 7]);
        assert!(ds.image(0).iter().all(|&p| p == 1.));
        assert!(ds.image(1).iter().all(|&p| p == 0.));
    }

    #[test]
    fn cifar100_uses_the_fine_label() {
        let bytes = record(&[4, 42], 51);
        let ds = decode(DatasetKind::Cifar100, &bytes).unwrap();

        assert_eq!(ds.labels(), [42]);
        assert!((ds.image(0)[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn truncated_and_mislabelled_files_are_rejected() {
        let mut bytes = record(&[1], 0);
        bytes.pop();
        assert!(decode(DatasetKind::Cifar10, &bytes).is_err());

        assert!(decode(DatasetKind::Cifar10, &record(&[10], 0)).is_err());
        assert!(decode(DatasetKind::Cifar10, &[]).is_err());
    }

    #[test]
    fn split_files() {
        let dir = Path::new("data");

        assert_eq!(files(DatasetKind::Cifar10, dir, Split::Train).len(), 5);
        assert_eq!(
            files(DatasetKind::Cifar100, dir, Split::Test),
            [dir.join("cifar-100-binary").join("test.bin")]
        );
    }
}

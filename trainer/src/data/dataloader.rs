use std::num::NonZeroUsize;

use ndarray::Array4;
use rand::{rngs::StdRng, seq::SliceRandom};
use rayon::prelude::*;

use super::{
    InMemoryDataset,
    augment::{CROP_PADDING, CropFlip},
};
use crate::error::{Result, TrainerErr};

/// An owned batch of images of shape `[N, C, H, W]` and their labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Walks a dataset in batches, optionally reshuffling it on every pass and augmenting
/// each image with a random crop and flip. The last batch may be smaller.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: InMemoryDataset,
    batch_size: usize,
    shuffle: bool,
    augment: bool,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
}

impl DataLoader {
    /// Creates a new `DataLoader` that yields the dataset in order, unaugmented.
    ///
    /// # Arguments
    /// * `dataset` - The images to load.
    /// * `batch_size` - The maximum amount of images per batch.
    /// * `rng` - The source of randomness for shuffling and augmentation.
    pub fn new(dataset: InMemoryDataset, batch_size: NonZeroUsize, rng: StdRng) -> Self {
        let order = (0..dataset.len()).collect();

        Self {
            dataset,
            batch_size: batch_size.get(),
            shuffle: false,
            augment: false,
            rng,
            order,
            cursor: 0,
        }
    }

    /// Reshuffles the samples on every pass, starting with the first one.
    pub fn with_shuffle(mut self) -> Self {
        self.shuffle = true;
        self.reset();
        self
    }

    /// Applies a random crop and horizontal flip to every image.
    pub fn with_augmentation(mut self) -> Self {
        self.augment = true;
        self
    }

    /// Returns the amount of batches in one pass.
    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Starts a new pass, reshuffling if enabled.
    pub fn reset(&mut self) {
        self.cursor = 0;

        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// Returns the next batch of the pass, or `None` if exhausted.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let transforms: Vec<_> = indices
            .iter()
            .map(|_| {
                if self.augment {
                    CropFlip::sample(&mut self.rng, CROP_PADDING)
                } else {
                    CropFlip::identity(CROP_PADDING)
                }
            })
            .collect();

        let dim = self.dataset.dim();
        let image_len = self.dataset.image_len();
        let mut pixels = vec![0.; indices.len() * image_len];

        pixels
            .par_chunks_mut(image_len)
            .zip(indices.par_iter().zip(&transforms))
            .for_each(|(out, (&idx, t))| {
                t.apply(self.dataset.image(idx), dim, CROP_PADDING, out);
            });

        let images = Array4::from_shape_vec((indices.len(), dim.0, dim.1, dim.2), pixels)
            .map_err(|e| TrainerErr::InvalidConfig(e.to_string()))?;
        let labels = indices.iter().map(|&i| self.dataset.label(i)).collect();

        Ok(Some(Batch { images, labels }))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn dataset(n: usize) -> InMemoryDataset {
        let pixels = (0..n * 4).map(|i| (i / 4) as f32).collect();
        InMemoryDataset::new((1, 2, 2), pixels, (0..n).collect()).unwrap()
    }

    fn drain(loader: &mut DataLoader) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = loader.next_batch().unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn ordered_batches_keep_the_tail() {
        let mut loader = DataLoader::new(
            dataset(5),
            NonZeroUsize::new(2).unwrap(),
            StdRng::seed_from_u64(0),
        );

        assert_eq!(loader.len(), 3);

        let batches = drain(&mut loader);
        let labels: Vec<_> = batches.iter().map(|b| b.labels.clone()).collect();
        assert_eq!(labels, [vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(batches[2].images.dim(), (1, 1, 2, 2));
        assert!(batches[1].images.iter().take(4).all(|&p| p == 2.));

        loader.reset();
        assert_eq!(drain(&mut loader).len(), 3);
    }

    #[test]
    fn shuffled_passes_cover_every_sample_once() {
        let mut loader = DataLoader::new(
            dataset(10),
            NonZeroUsize::new(3).unwrap(),
            StdRng::seed_from_u64(1),
        )
        .with_shuffle();

        let first: Vec<usize> = drain(&mut loader).into_iter().flat_map(|b| b.labels).collect();
        loader.reset();
        let second: Vec<usize> = drain(&mut loader).into_iter().flat_map(|b| b.labels).collect();

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn images_follow_their_labels() {
        let mut loader = DataLoader::new(
            dataset(6),
            NonZeroUsize::new(6).unwrap(),
            StdRng::seed_from_u64(2),
        )
        .with_shuffle();

        let batch = loader.next_batch().unwrap().unwrap();
        for (image, &label) in batch.images.outer_iter().zip(&batch.labels) {
            assert!(image.iter().all(|&p| p == label as f32));
        }
    }
}

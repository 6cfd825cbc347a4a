use crate::error::{Result, TrainerErr};

/// The `(channels, height, width)` of every image of a dataset.
pub type ImageDim = (usize, usize, usize);

/// Labelled images held in memory, each stored as a row-major `[C, H, W]` slice of pixels.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    dim: ImageDim,
    pixels: Vec<f32>,
    labels: Vec<usize>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Returns
    /// An error if the pixel count doesn't match one image per label.
    pub fn new(dim: ImageDim, pixels: Vec<f32>, labels: Vec<usize>) -> Result<Self> {
        let image_len = dim.0 * dim.1 * dim.2;

        if image_len == 0 || pixels.len() != labels.len() * image_len {
            return Err(TrainerErr::InvalidConfig(format!(
                "{} pixels can't hold {} images of {dim:?}",
                pixels.len(),
                labels.len()
            )));
        }

        Ok(Self {
            dim,
            pixels,
            labels,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> ImageDim {
        self.dim
    }

    #[inline]
    pub fn image_len(&self) -> usize {
        self.dim.0 * self.dim.1 * self.dim.2
    }

    /// Returns the pixels of the image at `idx` (panics if out of bounds).
    #[inline]
    pub fn image(&self, idx: usize) -> &[f32] {
        let len = self.image_len();
        &self.pixels[idx * len..][..len]
    }

    /// Returns the label of the image at `idx` (panics if out of bounds).
    #[inline]
    pub fn label(&self, idx: usize) -> usize {
        self.labels[idx]
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_contiguous_slices() {
        let ds = InMemoryDataset::new((1, 1, 2), vec![1., 2., 3., 4.], vec![0, 1]).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.image(1), [3., 4.]);
        assert_eq!(ds.label(1), 1);
    }

    #[test]
    fn pixel_count_must_match_the_labels() {
        assert!(InMemoryDataset::new((1, 1, 2), vec![1., 2., 3.], vec![0, 1]).is_err());
        assert!(InMemoryDataset::new((0, 1, 2), vec![], vec![]).is_err());
    }
}

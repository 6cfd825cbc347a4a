use rand::Rng;

use super::ImageDim;

/// The zero padding added on every side before cropping back to the original size.
pub const CROP_PADDING: usize = 4;

/// A random crop of a zero padded image followed by an optional horizontal flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropFlip {
    pub dy: usize,
    pub dx: usize,
    pub flip: bool,
}

impl CropFlip {
    /// The transform that leaves images untouched.
    pub fn identity(pad: usize) -> Self {
        Self {
            dy: pad,
            dx: pad,
            flip: false,
        }
    }

    /// Draws uniform crop offsets in `[0, 2 * pad]` and flips with probability `0.5`.
    pub fn sample<R: Rng>(rng: &mut R, pad: usize) -> Self {
        Self {
            dy: rng.random_range(0..=2 * pad),
            dx: rng.random_range(0..=2 * pad),
            flip: rng.random_bool(0.5),
        }
    }

    /// Writes the transformed `image` into `out`, both row-major `[C, H, W]` of shape `dim`.
    pub fn apply(&self, image: &[f32], dim: ImageDim, pad: usize, out: &mut [f32]) {
        let (c, h, w) = dim;

        for ch in 0..c {
            let src = &image[ch * h * w..][..h * w];
            let dst = &mut out[ch * h * w..][..h * w];

            for y in 0..h {
                let Some(sy) = (y + self.dy).checked_sub(pad).filter(|&sy| sy < h) else {
                    dst[y * w..][..w].fill(0.);
                    continue;
                };

                for x in 0..w {
                    let xc = if self.flip { w - 1 - x } else { x };
                    dst[y * w + x] = (xc + self.dx)
                        .checked_sub(pad)
                        .filter(|&sx| sx < w)
                        .map_or(0., |sx| src[sy * w + sx]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const DIM: ImageDim = (1, 2, 3);
    const IMAGE: [f32; 6] = [1., 2., 3., 4., 5., 6.];

    fn apply(t: CropFlip, pad: usize) -> [f32; 6] {
        let mut out = [f32::NAN; 6];
        t.apply(&IMAGE, DIM, pad, &mut out);
        out
    }

    #[test]
    fn identity_keeps_the_image() {
        assert_eq!(apply(CropFlip::identity(4), 4), IMAGE);
    }

    #[test]
    fn flip_mirrors_rows() {
        let t = CropFlip {
            flip: true,
            ..CropFlip::identity(1)
        };

        assert_eq!(apply(t, 1), [3., 2., 1., 6., 5., 4.]);
    }

    #[test]
    fn crops_shift_in_zeros() {
        let down_right = CropFlip {
            dy: 0,
            dx: 0,
            flip: false,
        };
        assert_eq!(apply(down_right, 1), [0., 0., 0., 0., 1., 2.]);

        let left = CropFlip {
            dy: 1,
            dx: 2,
            flip: false,
        };
        assert_eq!(apply(left, 1), [2., 3., 0., 5., 6., 0.]);
    }

    #[test]
    fn sampled_offsets_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let samples: Vec<_> = (0..200).map(|_| CropFlip::sample(&mut rng, 4)).collect();

        assert!(samples.iter().all(|t| t.dy <= 8 && t.dx <= 8));
        assert!(samples.iter().any(|t| t.flip) && samples.iter().any(|t| !t.flip));
    }
}

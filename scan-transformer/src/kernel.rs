use image::GrayImage;

use scan_core::config::{ConfigError, DEFAULT_BLUR_KERNEL_SIZE};

/// Binomial kernels used when sigma is derived from a small kernel size.
/// Sums are exactly 1 and every weight is a power-of-two fraction, so
/// blurring 8-bit input is exact before rounding.
const SMALL_GAUSSIAN_TAB: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// Normalized 1D Gaussian, applied separably along rows then columns.
///
/// Conventions:
/// - `size` is odd, `radius = size / 2`.
/// - sigma is not a parameter: `sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
/// - sizes up to 7 use the fixed binomial table instead of sampling.
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    pub size: usize,
    pub sigma: f32,
    pub weights: Vec<f32>,
}

impl GaussianKernel {
    pub fn auto_sigma(size: usize) -> f32 {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }

    /// Fails unless `size` is odd.
    pub fn with_size(size: usize) -> Result<Self, ConfigError> {
        if size % 2 == 0 {
            return Err(ConfigError::InvalidKernelSize(size));
        }
        Ok(Self::odd(size))
    }

    fn odd(size: usize) -> Self {
        let sigma = Self::auto_sigma(size);

        let weights = match SMALL_GAUSSIAN_TAB.get(size / 2) {
            Some(tab) => tab.to_vec(),
            None => {
                let radius = (size / 2) as isize;
                let sigma2 = sigma * sigma;
                let mut w: Vec<f32> = (-radius..=radius)
                    .map(|x| {
                        let xf = x as f32;
                        (-(xf * xf) / (2.0 * sigma2)).exp()
                    })
                    .collect();
                let sum: f32 = w.iter().sum();
                for wi in &mut w {
                    *wi /= sum;
                }
                w
            }
        };

        Self {
            size,
            sigma,
            weights,
        }
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }
}

impl Default for GaussianKernel {
    fn default() -> Self {
        Self::odd(DEFAULT_BLUR_KERNEL_SIZE as usize)
    }
}

/// Mirrors around the edge pixel without repeating it: `gfedcb|abcdefgh|gfedcba`.
pub fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = (2 * len - 2) as isize;
    let r = i.rem_euclid(period) as usize;
    if r < len {
        r
    } else {
        (2 * len - 2) - r
    }
}

/// Separable blur of an 8-bit image; rounds to nearest and saturates.
pub fn gaussian_blur(img: &GrayImage, kernel: &GaussianKernel) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return GrayImage::new(width, height);
    }

    let src = img.as_raw();
    let radius = kernel.radius() as isize;

    let mut horizontal = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        let out = &mut horizontal[y * w..(y + 1) * w];
        for (x, out_x) in out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.weights.iter().enumerate() {
                let idx = reflect101(x as isize + k as isize - radius, w);
                acc += row[idx] as f32 * kv;
            }
            *out_x = acc;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.weights.iter().enumerate() {
                let yy = reflect101(y as isize + k as isize - radius, h);
                acc += horizontal[yy * w + x] * kv;
            }
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    // Buffer length is width * height by construction.
    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

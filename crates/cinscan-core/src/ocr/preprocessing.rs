//! Image enhancement for OCR.
//!
//! Turns a photographed card into a binarized, high-contrast grayscale
//! image: grayscale, CLAHE, non-local-means denoising, Gaussian adaptive
//! threshold, then a morphological closing that reconnects broken strokes.

use image::{DynamicImage, GenericImageView, GrayImage, Luma, RgbImage, RgbaImage};
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::models::config::PreprocessConfig;

/// Image preprocessor for the OCR pipeline.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set enhancement parameters.
    pub fn with_config(mut self, config: PreprocessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Build an image from interleaved 8-bit samples.
    ///
    /// Accepts 1 (gray), 3 (RGB) or 4 (RGBA) channels.
    pub fn from_raw(width: u32, height: u32, channels: u8, samples: Vec<u8>) -> Result<DynamicImage> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidInput("empty image buffer".to_string()));
        }

        let expected = width as usize * height as usize * channels as usize;
        let got = samples.len();
        let mismatch = || {
            ScanError::InvalidInput(format!(
                "expected {} samples for {}x{}x{}, got {}",
                expected, width, height, channels, got
            ))
        };
        if matches!(channels, 1 | 3 | 4) && got != expected {
            return Err(mismatch());
        }

        match channels {
            1 => GrayImage::from_raw(width, height, samples)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(mismatch),
            3 => RgbImage::from_raw(width, height, samples)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch),
            4 => RgbaImage::from_raw(width, height, samples)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(mismatch),
            other => Err(ScanError::InvalidInput(format!(
                "unsupported channel count: {}",
                other
            ))),
        }
    }

    /// Run the full enhancement pipeline. The input is left untouched.
    pub fn enhance(&self, image: &DynamicImage) -> Result<GrayImage> {
        let gray = to_grayscale(image)?;
        let (width, height) = gray.dimensions();
        debug!("Enhancing {}x{} image", width, height);

        let cfg = &self.config;
        let contrasted = clahe(&gray, cfg.clahe_tile_grid, cfg.clahe_clip_limit);
        let denoised = denoise_nl_means(
            &contrasted,
            cfg.denoise_strength,
            cfg.denoise_patch_radius,
            cfg.denoise_search_radius,
        );
        let binary =
            gaussian_adaptive_threshold(&denoised, cfg.threshold_block_size, cfg.threshold_offset);
        let closed = close(&binary, cfg.closing_kernel_size);

        debug!("Enhancement complete");
        Ok(closed)
    }
}

/// Reduce any decoded image to one 8-bit luminance channel.
pub fn to_grayscale(image: &DynamicImage) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ScanError::InvalidInput("empty image buffer".to_string()));
    }

    match image {
        DynamicImage::ImageLuma8(gray) => Ok(gray.clone()),
        other => Ok(other.to_luma8()),
    }
}

/// Contrast-limited adaptive histogram equalization.
///
/// `grid` is the number of tiles (columns, rows); `clip_limit` is relative
/// to the height of a uniform histogram.
pub fn clahe(image: &GrayImage, grid: (u32, u32), clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let tile_w = width.div_ceil(grid.0.max(1)).max(1);
    let tile_h = height.div_ceil(grid.1.max(1)).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            let area = (x1 - x0) * (y1 - y0);
            let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            clip_histogram(&mut hist, clip);

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u32;
            for (bin, count) in hist.iter().enumerate() {
                cdf += count;
                lut[bin] = ((cdf as f32 * 255.0 / area as f32).round()).min(255.0) as u8;
            }
        }
    }

    // Bilinear blend between the LUTs of the four nearest tile centres.
    let axis = |pos: u32, tile: u32, tiles: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let i0 = (f.floor().max(0.0) as u32).min(tiles - 1);
        let i1 = (i0 + 1).min(tiles - 1);
        let a = (f - i0 as f32).clamp(0.0, 1.0);
        (i0 as usize, i1 as usize, a)
    };

    let mut result = GrayImage::new(width, height);
    let stride = tiles_x as usize;

    for y in 0..height {
        let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
            let v = image.get_pixel(x, y)[0] as usize;

            let tl = luts[ty0 * stride + tx0][v] as f32;
            let tr = luts[ty0 * stride + tx1][v] as f32;
            let bl = luts[ty1 * stride + tx0][v] as f32;
            let br = luts[ty1 * stride + tx1][v] as f32;

            let top = tl + (tr - tl) * ax;
            let bottom = bl + (br - bl) * ax;
            let value = top + (bottom - top) * ay;

            result.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    result
}

/// Clip bins at `clip` and spread the excess evenly over the histogram.
fn clip_histogram(hist: &mut [u32; 256], clip: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let per_bin = excess / 256;
    let mut residual = excess % 256;
    for count in hist.iter_mut() {
        *count += per_bin;
    }

    if residual > 0 {
        let step = (256 / residual as usize).max(1);
        for count in hist.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *count += 1;
            residual -= 1;
        }
    }
}

/// Non-local-means denoising.
///
/// Each pixel becomes a weighted mean of the pixels in its search window,
/// weighted by `exp(-d / h^2)` where `d` is the mean squared difference
/// between the two surrounding patches. Patch distances for one offset are
/// read from an integral image, so cost is linear in the search area.
pub fn denoise_nl_means(
    image: &GrayImage,
    strength: f32,
    patch_radius: u32,
    search_radius: u32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let src: Vec<f32> = image.pixels().map(|p| p[0] as f32).collect();

    let h2 = (strength * strength).max(f32::EPSILON) as f64;
    let pr = patch_radius as usize;
    let sr = search_radius as i64;

    let mut weight_sum = vec![0f64; w * h];
    let mut value_sum = vec![0f64; w * h];
    let mut shifted = vec![0f32; w * h];
    let mut integral = vec![0f64; (w + 1) * (h + 1)];

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            for y in 0..h {
                let sy = clamp_index(y as i64 + dy, h);
                for x in 0..w {
                    let sx = clamp_index(x as i64 + dx, w);
                    shifted[y * w + x] = src[sy * w + sx];
                }
            }

            // Integral of squared differences, one row/column of padding.
            for y in 0..h {
                let mut row = 0f64;
                for x in 0..w {
                    let d = (src[y * w + x] - shifted[y * w + x]) as f64;
                    row += d * d;
                    integral[(y + 1) * (w + 1) + x + 1] = integral[y * (w + 1) + x + 1] + row;
                }
            }

            for y in 0..h {
                let y0 = y.saturating_sub(pr);
                let y1 = (y + pr).min(h - 1) + 1;
                for x in 0..w {
                    let x0 = x.saturating_sub(pr);
                    let x1 = (x + pr).min(w - 1) + 1;

                    let sum = integral[y1 * (w + 1) + x1] - integral[y0 * (w + 1) + x1]
                        - integral[y1 * (w + 1) + x0]
                        + integral[y0 * (w + 1) + x0];
                    let count = ((y1 - y0) * (x1 - x0)) as f64;

                    let weight = (-(sum / count).max(0.0) / h2).exp();
                    weight_sum[y * w + x] += weight;
                    value_sum[y * w + x] += weight * shifted[y * w + x] as f64;
                }
            }
        }
    }

    let mut result = GrayImage::new(width, height);
    for (i, pixel) in result.pixels_mut().enumerate() {
        let value = value_sum[i] / weight_sum[i];
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }

    result
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes white when it is strictly brighter than the Gaussian mean
/// of its `block_size` window minus `offset`. Borders replicate edge pixels.
pub fn gaussian_adaptive_threshold(image: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let mean = separable_filter_equal(image, &gaussian_kernel(block_size));

    let mut result = GrayImage::new(image.width(), image.height());
    for ((out, src), local) in result.pixels_mut().zip(image.pixels()).zip(mean.pixels()) {
        let threshold = local[0] as i32 - offset;
        out[0] = if src[0] as i32 > threshold { 255 } else { 0 };
    }

    result
}

/// Normalized 1-D Gaussian kernel of `size` taps.
///
/// Sigma follows the usual derivation from the window size:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as f32;

    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - radius;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let total: f32 = kernel.iter().sum();
    for weight in kernel.iter_mut() {
        *weight /= total;
    }
    kernel
}

/// Morphological closing (dilate, then erode) with a square element.
///
/// Erosion uses the reflected element, so for even sizes the result never
/// loses a white pixel of the input.
pub fn close(image: &GrayImage, kernel_size: u8) -> GrayImage {
    let size = kernel_size.max(1);
    let element = GrayImage::from_pixel(size as u32, size as u32, Luma([255]));
    let anchor = size / 2;
    let mask = Mask::from_image(&element, anchor, anchor);
    let reflected = Mask::from_image(&element, size - 1 - anchor, size - 1 - anchor);

    let dilated = grayscale_dilate(image, &mask);
    grayscale_erode(&dilated, &reflected)
}

fn clamp_index(value: i64, len: usize) -> usize {
    value.clamp(0, len as i64 - 1) as usize
}

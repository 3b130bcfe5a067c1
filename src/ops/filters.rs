// ============================================================================
// FILTERS — separable gaussian blur for coverage masks (soft shadows)
// ============================================================================

use image::GrayImage;
use rayon::prelude::*;

/// Convert a canvas-style `shadowBlur` radius to a gaussian sigma
/// (the blur is specified as twice the standard deviation).
pub fn shadow_blur_sigma(shadow_blur: f32) -> f32 {
    (shadow_blur * 0.5).max(0.0)
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Rayon-parallelized separable Gaussian blur of a single-channel mask.
/// Pixels beyond the edges count as empty, so coverage fades out at the
/// border instead of smearing.
pub fn blur_coverage(src: &GrayImage, sigma: f32) -> GrayImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; w * h];
    buf_h.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * w..(y + 1) * w];
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = x as isize + ki as isize - radius as isize;
                if sx >= 0 && (sx as usize) < w {
                    acc += row_in[sx as usize] * kv;
                }
            }
            *out = acc;
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut out = GrayImage::new(w as u32, h as u32);
    let out_raw: &mut [u8] = out.as_mut();
    out_raw.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = y as isize + ki as isize - radius as isize;
                if sy >= 0 && (sy as usize) < h {
                    acc += buf_h[sy as usize * w + x] * kv;
                }
            }
            *out = acc.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn kernel_is_normalized() {
        let k = build_gaussian_kernel(2.0);
        assert_eq!(k.len(), 13);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(k[6] > k[5] && k[5] > k[0]);
    }

    #[test]
    fn blur_spreads_and_preserves_interior() {
        let mut m = GrayImage::new(21, 21);
        for y in 5..16 {
            for x in 5..16 {
                m.put_pixel(x, y, Luma([255]));
            }
        }
        let b = blur_coverage(&m, 1.0);
        assert_eq!(b.get_pixel(10, 10)[0], 255);
        assert!(b.get_pixel(4, 10)[0] > 0);
        assert!(b.get_pixel(5, 10)[0] < 255);
        assert_eq!(b.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let m = GrayImage::from_pixel(3, 3, Luma([77]));
        assert_eq!(blur_coverage(&m, 0.0), m);
        assert_eq!(shadow_blur_sigma(4.0), 2.0);
    }
}

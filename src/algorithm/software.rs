//! CPU separable Gaussian blur on premultiplied RGBA8, Q16 fixed point, clamp-to-edge.

use std::collections::HashMap;
use std::sync::Arc;

use crate::algorithm::{BackendKind, BlurAlgorithm};
use crate::bitmap::Bitmap;
use crate::foundation::error::{BlurError, BlurResult};

/// Largest kernel radius in pixels; larger requests are clamped.
pub const MAX_RADIUS_PX: u32 = 256;

/// Downscale factor requested by the software backend. Cost grows with pixel count.
pub const SOFTWARE_SCALE_FACTOR: f32 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct KernelKey {
    radius_px: u32,
    sigma_bits: u32,
}

/// CPU backend. Kernels and scratch rows are cached across frames.
#[derive(Debug, Default)]
pub struct SoftwareBlur {
    in_place: bool,
    kernel_cache: HashMap<KernelKey, Arc<Vec<u32>>>,
    scratch_a: Vec<u8>,
    scratch_b: Vec<u8>,
}

impl SoftwareBlur {
    /// New backend. With `in_place == false`, every blur returns a freshly allocated buffer.
    pub fn new(in_place: bool) -> Self {
        Self {
            in_place,
            ..Self::default()
        }
    }

    fn kernel(&mut self, radius_px: u32) -> BlurResult<Arc<Vec<u32>>> {
        let sigma = radius_px as f32 / 2.0;
        let key = KernelKey {
            radius_px,
            sigma_bits: sigma.to_bits(),
        };
        if let Some(k) = self.kernel_cache.get(&key) {
            return Ok(Arc::clone(k));
        }
        let k = Arc::new(gaussian_kernel_q16(radius_px, sigma)?);
        self.kernel_cache.insert(key, Arc::clone(&k));
        Ok(k)
    }
}

/// Validate a radius and round it to whole pixels.
pub(crate) fn radius_px(radius: f32) -> BlurResult<u32> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(BlurError::validation(format!(
            "blur radius must be finite and >= 0, got {radius}"
        )));
    }
    Ok((radius.round() as u32).min(MAX_RADIUS_PX))
}

impl BlurAlgorithm for SoftwareBlur {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    #[tracing::instrument(
        level = "trace",
        skip(self, bitmap),
        fields(w = bitmap.width(), h = bitmap.height())
    )]
    fn blur(&mut self, bitmap: &mut Bitmap, radius: f32) -> BlurResult<Option<Bitmap>> {
        let r = radius_px(radius)?;
        let (w, h) = (bitmap.width(), bitmap.height());
        let expected = bitmap.data().len();

        if r == 0 {
            return if self.in_place {
                Ok(None)
            } else {
                bitmap.duplicate().map(Some)
            };
        }

        let kernel = self.kernel(r)?;
        self.scratch_a.resize(expected, 0);
        self.scratch_b.resize(expected, 0);

        if self.in_place {
            self.scratch_b.copy_from_slice(bitmap.data());
            blur_rgba8_premul_q16(
                &self.scratch_b,
                bitmap.data_mut(),
                &mut self.scratch_a,
                w,
                h,
                &kernel,
            );
            Ok(None)
        } else {
            let mut out = Bitmap::new(bitmap.size(), bitmap.format())?;
            blur_rgba8_premul_q16(
                bitmap.data(),
                out.data_mut(),
                &mut self.scratch_a,
                w,
                h,
                &kernel,
            );
            Ok(Some(out))
        }
    }

    fn can_modify_bitmap(&self) -> bool {
        self.in_place
    }

    fn scale_factor(&self) -> f32 {
        SOFTWARE_SCALE_FACTOR
    }

    fn teardown(&mut self) {
        self.kernel_cache.clear();
        self.scratch_a = Vec::new();
        self.scratch_b = Vec::new();
    }
}

pub(crate) fn gaussian_kernel_q16(radius: u32, sigma: f32) -> BlurResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(BlurError::validation("blur sigma must be finite and > 0"));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(BlurError::backend("gaussian kernel sum is zero"));
    }

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|wf| ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

pub(crate) fn blur_rgba8_premul_q16(
    src: &[u8],
    dst: &mut [u8],
    tmp: &mut [u8],
    width: u32,
    height: u32,
    kernel_q16: &[u32],
) {
    if kernel_q16.len() == 1 {
        dst.copy_from_slice(src);
        return;
    }
    blur_pass_q16(src, tmp, width, height, kernel_q16, Axis::Horizontal);
    blur_pass_q16(tmp, dst, width, height, kernel_q16, Axis::Vertical);
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn blur_pass_q16(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32], axis: Axis) {
    let radius = (k.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let d = ki as i32 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + d).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + d).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/algorithm/software.rs"]
mod tests;

//! Downscaled snapshot sizing.
//!
//! The snapshot is captured at a reduced resolution. Its row width is rounded up to a multiple of
//! [`ROW_ALIGNMENT`] so backends that require aligned strides can consume it without an extra
//! copy. Only the width is aligned; the height is re-derived from the width's effective factor so
//! aspect distortion stays within one pixel of rounding.

use crate::foundation::core::Size;
use crate::foundation::error::{BlurError, BlurResult};

/// Default stride alignment, in pixels, applied to snapshot widths.
///
/// 16 is enough for most drivers; some require 64, so 64 is used unless a backend opts out.
pub const ROW_ALIGNMENT: u32 = 64;

/// Default downscale factor used when a backend has no stronger preference.
pub const DEFAULT_SCALE_FACTOR: f32 = 6.0;

/// Outcome of [`SizeScaler::scale`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleResult {
    /// Snapshot width in pixels, aligned unless alignment is disabled.
    pub width: u32,
    /// Snapshot height in pixels.
    pub height: u32,
    /// Applied horizontal factor: `source_width / width`.
    pub scale_x: f32,
    /// Applied vertical factor: `source_height / height`.
    pub scale_y: f32,
}

impl ScaleResult {
    /// Snapshot dimensions.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Converts a view size and a requested downscale factor into a stride-safe snapshot size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeScaler {
    scale_factor: f32,
    alignment: Option<u32>,
}

impl SizeScaler {
    /// Create a scaler aligning widths to [`ROW_ALIGNMENT`].
    ///
    /// Fails when `scale_factor` is not a finite positive number.
    pub fn new(scale_factor: f32) -> BlurResult<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(BlurError::validation(format!(
                "scale factor must be finite and > 0, got {scale_factor}"
            )));
        }
        Ok(Self {
            scale_factor,
            alignment: Some(ROW_ALIGNMENT),
        })
    }

    /// Replace the width alignment. `None` disables alignment entirely.
    pub fn with_alignment(mut self, alignment: Option<u32>) -> BlurResult<Self> {
        if alignment == Some(0) {
            return Err(BlurError::validation("row alignment must be > 0"));
        }
        self.alignment = alignment;
        Ok(self)
    }

    /// Requested downscale factor.
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Active width alignment, if any.
    pub fn alignment(&self) -> Option<u32> {
        self.alignment
    }

    /// `ceil(dimension / factor)`. Ceiling keeps the right and bottom edges covered.
    pub fn downscale(&self, dimension: u32) -> u32 {
        (dimension as f32 / self.scale_factor).ceil() as u32
    }

    /// Round `raw_width` up to the next multiple of the alignment.
    ///
    /// Never returns zero: widths below the alignment yield the alignment itself.
    pub fn align(&self, raw_width: u32) -> u32 {
        let raw_width = raw_width.max(1);
        match self.alignment {
            None => raw_width,
            Some(a) => raw_width.div_ceil(a).saturating_mul(a),
        }
    }

    /// `true` when either axis downscales to zero pixels.
    ///
    /// The controller uses this to defer allocation until layout reports a real size.
    pub fn is_zero_sized(&self, width: u32, height: u32) -> bool {
        self.downscale(width) == 0 || self.downscale(height) == 0
    }

    /// Compute the snapshot size for a view of `source` pixels.
    ///
    /// Returns `None` for zero-sized input.
    pub fn scale(&self, source: Size) -> Option<ScaleResult> {
        if self.is_zero_sized(source.width, source.height) {
            return None;
        }
        let width = self.align(self.downscale(source.width));
        let scale_x = source.width as f32 / width as f32;
        let height = ((source.height as f32 / scale_x).ceil() as u32).max(1);
        let scale_y = source.height as f32 / height as f32;
        Some(ScaleResult {
            width,
            height,
            scale_x,
            scale_y,
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/scale/size_scaler.rs"]
mod tests;

//! Interchangeable blur backends.
//!
//! - [`noop::NoOpBlur`] passes pixels through untouched.
//! - [`software::SoftwareBlur`] runs a separable Gaussian on the CPU.
//! - [`compositor::CompositorBlur`] records an [`compositor::EffectNode`] for the host compositor.
//! - [`compute::ComputeBlur`] drives an external [`compute::ComputeContext`] (wgpu with feature
//!   `gpu`).
//!
//! Pick a backend once per controller with [`select_backend`] and [`create_algorithm`].

pub mod compositor;
pub mod compute;
pub mod noop;
pub mod software;
#[cfg(feature = "gpu")]
pub mod wgpu_compute;

use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::foundation::core::PixelFormat;
use crate::foundation::error::{BlurError, BlurResult};
use crate::host::DrawSurface;
use crate::scale::{DEFAULT_SCALE_FACTOR, ROW_ALIGNMENT, SizeScaler};

pub use compositor::RenderEffectPrecision;

/// Default blur radius in snapshot pixels.
pub const DEFAULT_BLUR_RADIUS: f32 = 16.0;

/// A blur implementation the controller can drive without knowing which one it is.
pub trait BlurAlgorithm: std::fmt::Debug {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Blur `bitmap` by `radius`.
    ///
    /// Returns `Ok(None)` when `bitmap` now holds the result, or `Ok(Some(out))` when the
    /// result lives in a new buffer. In the latter case the caller must stop drawing into
    /// `bitmap` and use `out` from now on.
    fn blur(&mut self, bitmap: &mut Bitmap, radius: f32) -> BlurResult<Option<Bitmap>>;

    /// Whether [`BlurAlgorithm::blur`] writes its result into the input buffer.
    ///
    /// The controller follows the `Option` returned by `blur`. This must agree with it:
    /// `true` exactly when `blur` returns `Ok(None)`.
    fn can_modify_bitmap(&self) -> bool;

    /// Pixel layout the backend wants its input in.
    fn preferred_pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgba8Premul
    }

    /// Requested downscale factor for the snapshot.
    fn scale_factor(&self) -> f32 {
        DEFAULT_SCALE_FACTOR
    }

    /// Row alignment the snapshot width must satisfy, or `None` for any width.
    fn row_alignment(&self) -> Option<u32> {
        Some(ROW_ALIGNMENT)
    }

    /// Draw the blurred `bitmap` onto `surface` at the current transform.
    fn render(&mut self, surface: &mut dyn DrawSurface, bitmap: &Bitmap) -> BlurResult<()> {
        surface.draw_bitmap(bitmap);
        Ok(())
    }

    /// Release backend-owned resources. Safe to call repeatedly or before any blur.
    fn teardown(&mut self) {}
}

/// Build the [`SizeScaler`] matching `algorithm`'s sizing hints.
pub fn size_scaler(algorithm: &dyn BlurAlgorithm) -> BlurResult<SizeScaler> {
    SizeScaler::new(algorithm.scale_factor())?.with_alignment(algorithm.row_alignment())
}

/// Available blur backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Identity pass.
    NoOp,
    /// CPU separable Gaussian.
    Software,
    /// Blur performed by the host compositor at composite time.
    CompositorEffect,
    /// GPU compute driven synchronously on the main thread.
    LegacyCompute,
}

/// Coarse capability level of the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTier {
    /// No drawing target worth blurring for.
    Headless,
    /// CPU only.
    Software,
    /// A GPU usable for compute but no compositor effects.
    LegacyGpu,
    /// A compositor that can blur render nodes itself.
    Compositor,
}

/// Map a capability tier to the backend to use for it.
pub const fn select_backend(tier: CapabilityTier) -> BackendKind {
    match tier {
        CapabilityTier::Headless => BackendKind::NoOp,
        CapabilityTier::Software => BackendKind::Software,
        CapabilityTier::LegacyGpu => {
            if cfg!(feature = "gpu") {
                BackendKind::LegacyCompute
            } else {
                BackendKind::Software
            }
        }
        CapabilityTier::Compositor => BackendKind::CompositorEffect,
    }
}

/// Knobs for [`create_algorithm`].
#[derive(Clone, Copy, Debug)]
pub struct AlgorithmSettings {
    /// Blur into the input buffer instead of returning a new one, where the backend supports
    /// both.
    pub in_place: bool,
    /// Sizing strategy for [`BackendKind::CompositorEffect`].
    pub precision: RenderEffectPrecision,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            in_place: true,
            precision: RenderEffectPrecision::default(),
        }
    }
}

/// Instantiate a backend.
///
/// Returns [`BlurError::Unavailable`] for kinds that are not compiled in or whose device cannot
/// be opened.
pub fn create_algorithm(
    kind: BackendKind,
    settings: &AlgorithmSettings,
) -> BlurResult<Box<dyn BlurAlgorithm>> {
    match kind {
        BackendKind::NoOp => Ok(Box::new(noop::NoOpBlur::new())),
        BackendKind::Software => Ok(Box::new(software::SoftwareBlur::new(settings.in_place))),
        BackendKind::CompositorEffect => {
            Ok(Box::new(compositor::CompositorBlur::new(settings.precision)))
        }
        #[cfg(feature = "gpu")]
        BackendKind::LegacyCompute => {
            let ctx = wgpu_compute::WgpuComputeContext::new()?;
            Ok(Box::new(compute::ComputeBlur::new(Box::new(ctx), settings.in_place)))
        }
        #[allow(unreachable_patterns)]
        _ => Err(BlurError::unavailable(format!(
            "{kind:?} backend is not enabled in this build"
        ))),
    }
}

//! Backend that leaves the blur to the host compositor.
//!
//! `blur` only records an [`EffectNode`]; pixels are never touched on the main thread. Targets
//! without a compositor get a lazily created software fallback.

use serde::{Deserialize, Serialize};

use crate::algorithm::software::{SoftwareBlur, radius_px};
use crate::algorithm::{BackendKind, BlurAlgorithm};
use crate::bitmap::Bitmap;
use crate::foundation::core::Size;
use crate::foundation::error::BlurResult;
use crate::host::DrawSurface;
use crate::scale::DEFAULT_SCALE_FACTOR;

/// How large a snapshot the compositor backend asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderEffectPrecision {
    /// Full-resolution snapshot, no row alignment. Smoothest under motion.
    Exact,
    /// Downscaled snapshot like the other backends.
    #[default]
    Downscaled,
}

/// A recorded snapshot tagged with a blur radius, for the host compositor to render.
#[derive(Debug)]
pub struct EffectNode {
    content: Bitmap,
    radius: f32,
}

impl EffectNode {
    /// Recorded pixels, unblurred.
    pub fn content(&self) -> &Bitmap {
        &self.content
    }

    /// Blur radius to apply, in content pixels.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Node bounds.
    pub fn size(&self) -> Size {
        self.content.size()
    }

    /// Blur the recorded content on the CPU, as a compositor without native blur would.
    pub fn rasterize(&self) -> BlurResult<Bitmap> {
        let mut out = self.content.duplicate()?;
        SoftwareBlur::new(true).blur(&mut out, self.radius)?;
        Ok(out)
    }
}

/// Compositor-effect backend.
#[derive(Debug)]
pub struct CompositorBlur {
    precision: RenderEffectPrecision,
    node: Option<EffectNode>,
    last_radius: f32,
    fallback: Option<SoftwareBlur>,
    fallback_scratch: Option<Bitmap>,
}

impl CompositorBlur {
    /// New backend with no recorded node.
    pub fn new(precision: RenderEffectPrecision) -> Self {
        Self {
            precision,
            node: None,
            last_radius: 1.0,
            fallback: None,
            fallback_scratch: None,
        }
    }

    /// Sizing strategy.
    pub fn precision(&self) -> RenderEffectPrecision {
        self.precision
    }

    /// Most recently recorded node.
    pub fn node(&self) -> Option<&EffectNode> {
        self.node.as_ref()
    }

    /// Whether the software fallback has been created.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn render_fallback(
        &mut self,
        surface: &mut dyn DrawSurface,
        bitmap: &Bitmap,
    ) -> BlurResult<()> {
        let mut scratch = match self.fallback_scratch.take() {
            Some(mut s) if s.size() == bitmap.size() => {
                s.copy_from(bitmap)?;
                s
            }
            _ => bitmap.duplicate()?,
        };
        let fallback = self.fallback.get_or_insert_with(|| {
            tracing::debug!("creating software fallback for compositor blur");
            SoftwareBlur::new(true)
        });
        let blurred = fallback.blur(&mut scratch, self.last_radius)?;
        surface.draw_bitmap(blurred.as_ref().unwrap_or(&scratch));
        self.fallback_scratch = Some(scratch);
        Ok(())
    }
}

impl BlurAlgorithm for CompositorBlur {
    fn kind(&self) -> BackendKind {
        BackendKind::CompositorEffect
    }

    fn blur(&mut self, bitmap: &mut Bitmap, radius: f32) -> BlurResult<Option<Bitmap>> {
        radius_px(radius)?;
        self.last_radius = radius;
        match self.node.as_mut() {
            Some(node) if node.content.size() == bitmap.size() => {
                node.content.copy_from(bitmap)?;
                node.radius = radius;
            }
            _ => {
                self.node = Some(EffectNode {
                    content: bitmap.duplicate()?,
                    radius,
                });
            }
        }
        Ok(None)
    }

    fn can_modify_bitmap(&self) -> bool {
        true
    }

    fn scale_factor(&self) -> f32 {
        match self.precision {
            RenderEffectPrecision::Exact => 1.0,
            RenderEffectPrecision::Downscaled => DEFAULT_SCALE_FACTOR,
        }
    }

    fn row_alignment(&self) -> Option<u32> {
        match self.precision {
            RenderEffectPrecision::Exact => None,
            RenderEffectPrecision::Downscaled => Some(crate::scale::ROW_ALIGNMENT),
        }
    }

    fn render(&mut self, surface: &mut dyn DrawSurface, bitmap: &Bitmap) -> BlurResult<()> {
        if surface.is_hardware_accelerated() {
            if let Some(node) = &self.node {
                surface.draw_effect_node(node);
                return Ok(());
            }
        }
        self.render_fallback(surface, bitmap)
    }

    fn teardown(&mut self) {
        self.node = None;
        self.fallback_scratch = None;
        if let Some(mut fallback) = self.fallback.take() {
            fallback.teardown();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/algorithm/compositor.rs"]
mod tests;

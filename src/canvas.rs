//! Software drawing surfaces backed by [`Bitmap`]s.
//!
//! Drawing is recorded into a `vello_cpu` render context and composited onto the bitmap on
//! [`PixmapCanvas::flush`]. Reads of the bitmap see only flushed content.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitmap::Bitmap;
use crate::foundation::core::{Affine, Color, PixelFormat, Rect, Size};
use crate::foundation::error::{BlurError, BlurResult};
use crate::foundation::math::premul_over_in_place;
use crate::host::DrawSurface;

static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

/// Identity tag carried by snapshot surfaces.
///
/// A draw pass that sees a marker on its target knows it is being rendered into some blur
/// pipeline's snapshot rather than onto a host canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotMarker(u64);

impl SnapshotMarker {
    fn next() -> Self {
        Self(NEXT_MARKER.fetch_add(1, Ordering::Relaxed))
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn rect_to_cpu(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn checked_ctx_dims(size: Size) -> BlurResult<(u16, u16)> {
    let w = u16::try_from(size.width)
        .map_err(|_| BlurError::validation("canvas width exceeds u16"))?;
    let h = u16::try_from(size.height)
        .map_err(|_| BlurError::validation("canvas height exceeds u16"))?;
    Ok((w, h))
}

/// A [`DrawSurface`] that rasterizes onto an owned [`Bitmap`].
pub struct PixmapCanvas {
    bitmap: Bitmap,
    ctx: vello_cpu::RenderContext,
    scratch: vello_cpu::Pixmap,
    transform: Affine,
    stack: Vec<Affine>,
    pending: bool,
    hardware: bool,
}

impl PixmapCanvas {
    /// Transparent canvas of `size`.
    pub fn new(size: Size) -> BlurResult<Self> {
        Self::from_bitmap(Bitmap::new(size, PixelFormat::Rgba8Premul)?)
    }

    /// Canvas drawing on top of existing pixels.
    pub fn from_bitmap(bitmap: Bitmap) -> BlurResult<Self> {
        let (w, h) = checked_ctx_dims(bitmap.size())?;
        Ok(Self {
            bitmap,
            ctx: vello_cpu::RenderContext::new(w, h),
            scratch: vello_cpu::Pixmap::new(w, h),
            transform: Affine::IDENTITY,
            stack: Vec::new(),
            pending: false,
            hardware: false,
        })
    }

    /// Report the canvas as compositor-backed, so effect nodes are accepted.
    ///
    /// Effect nodes drawn on such a canvas are rasterized in software, emulating a host
    /// compositor.
    pub fn with_hardware_acceleration(mut self, hardware: bool) -> Self {
        self.hardware = hardware;
        self
    }

    /// Current transform.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Backing bitmap. Unflushed drawing is not visible.
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Mutable backing bitmap. Unflushed drawing is not visible.
    pub fn bitmap_mut(&mut self) -> &mut Bitmap {
        &mut self.bitmap
    }

    /// Discard pending drawing and overwrite every pixel with `color`.
    pub fn erase(&mut self, color: Color) {
        self.ctx.reset();
        self.pending = false;
        self.bitmap.erase(color);
    }

    /// Composite pending drawing onto the bitmap.
    pub fn flush(&mut self) -> BlurResult<()> {
        if !self.pending {
            return Ok(());
        }
        self.ctx.flush();
        self.scratch.data_as_u8_slice_mut().fill(0);
        self.ctx.render_to_pixmap(&mut self.scratch);
        premul_over_in_place(self.bitmap.data_mut(), self.scratch.data_as_u8_slice())?;
        self.ctx.reset();
        self.pending = false;
        Ok(())
    }

    /// Swap the backing bitmap, returning the previous one. Pending drawing is flushed first.
    pub fn replace_bitmap(&mut self, bitmap: Bitmap) -> BlurResult<Bitmap> {
        self.flush()?;
        if bitmap.size() != self.bitmap.size() {
            let (w, h) = checked_ctx_dims(bitmap.size())?;
            self.ctx = vello_cpu::RenderContext::new(w, h);
            self.scratch = vello_cpu::Pixmap::new(w, h);
        }
        Ok(std::mem::replace(&mut self.bitmap, bitmap))
    }

    /// Flush and return the backing bitmap.
    pub fn into_bitmap(mut self) -> BlurResult<Bitmap> {
        self.flush()?;
        Ok(self.bitmap)
    }

    fn fill_with_paint(&mut self, transform: Affine, rect: Rect) {
        self.ctx.set_transform(affine_to_cpu(transform));
        self.ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.fill_rect(&rect_to_cpu(rect));
        self.pending = true;
    }
}

impl DrawSurface for PixmapCanvas {
    fn size(&self) -> Size {
        self.bitmap.size()
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
    }

    fn restore(&mut self) {
        if let Some(t) = self.stack.pop() {
            self.transform = t;
        }
    }

    fn concat(&mut self, transform: Affine) {
        self.transform *= transform;
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if color.is_transparent() {
            return;
        }
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.red(),
            color.green(),
            color.blue(),
            color.alpha(),
        ));
        self.fill_with_paint(self.transform, rect);
    }

    fn draw_color(&mut self, color: Color) {
        let size = self.size();
        let full = Rect::new(0.0, 0.0, f64::from(size.width), f64::from(size.height));
        if color.is_transparent() {
            return;
        }
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.red(),
            color.green(),
            color.blue(),
            color.alpha(),
        ));
        self.fill_with_paint(Affine::IDENTITY, full);
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap) {
        let image = match bitmap.to_image() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "dropping bitmap draw");
                return;
            }
        };
        self.ctx.set_paint(image);
        let rect = Rect::new(0.0, 0.0, f64::from(bitmap.width()), f64::from(bitmap.height()));
        self.fill_with_paint(self.transform, rect);
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.hardware
    }

    fn draw_effect_node(&mut self, node: &crate::algorithm::compositor::EffectNode) {
        match node.rasterize() {
            Ok(bitmap) => self.draw_bitmap(&bitmap),
            Err(e) => tracing::warn!(error = %e, "failed to rasterize effect node"),
        }
    }
}

impl std::fmt::Debug for PixmapCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixmapCanvas")
            .field("bitmap", &self.bitmap)
            .field("transform", &self.transform)
            .field("depth", &self.stack.len())
            .field("pending", &self.pending)
            .field("hardware", &self.hardware)
            .finish()
    }
}

/// The pipeline-owned surface the root view is rendered into.
///
/// Identical to a [`PixmapCanvas`] except that it reports a [`SnapshotMarker`], which lets blur
/// surfaces inside the captured tree skip themselves.
#[derive(Debug)]
pub struct SnapshotCanvas {
    marker: SnapshotMarker,
    inner: PixmapCanvas,
}

impl SnapshotCanvas {
    /// Wrap `bitmap` with a fresh marker.
    pub fn new(bitmap: Bitmap) -> BlurResult<Self> {
        Ok(Self {
            marker: SnapshotMarker::next(),
            inner: PixmapCanvas::from_bitmap(bitmap)?,
        })
    }

    /// Marker identifying this surface.
    pub fn marker(&self) -> SnapshotMarker {
        self.marker
    }

    /// Buffer the canvas currently draws into.
    pub fn bitmap(&self) -> &Bitmap {
        self.inner.bitmap()
    }

    /// Mutable buffer the canvas currently draws into.
    pub fn bitmap_mut(&mut self) -> &mut Bitmap {
        self.inner.bitmap_mut()
    }

    /// Repoint the canvas at `bitmap`, returning the previous buffer.
    pub fn set_bitmap(&mut self, bitmap: Bitmap) -> BlurResult<Bitmap> {
        self.inner.replace_bitmap(bitmap)
    }

    /// Discard pending drawing and fill with `color`.
    pub fn erase(&mut self, color: Color) {
        self.inner.erase(color);
    }

    /// Composite pending drawing onto the buffer.
    pub fn flush(&mut self) -> BlurResult<()> {
        self.inner.flush()
    }

    /// Flush and release the buffer.
    pub fn into_bitmap(self) -> BlurResult<Bitmap> {
        self.inner.into_bitmap()
    }
}

impl DrawSurface for SnapshotCanvas {
    fn size(&self) -> Size {
        self.inner.size()
    }

    fn save(&mut self) {
        self.inner.save();
    }

    fn restore(&mut self) {
        self.inner.restore();
    }

    fn concat(&mut self, transform: Affine) {
        self.inner.concat(transform);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.inner.fill_rect(rect, color);
    }

    fn draw_color(&mut self, color: Color) {
        self.inner.draw_color(color);
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap) {
        self.inner.draw_bitmap(bitmap);
    }

    fn snapshot_marker(&self) -> Option<SnapshotMarker> {
        Some(self.marker)
    }
}

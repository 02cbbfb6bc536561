//! Owned pixel buffers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::core::{Color, PixelFormat, Size};
use crate::foundation::error::{BlurError, BlurResult};

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Bitmap`] allocation.
///
/// Two bitmaps never share an id, even when their pixels are identical. Copies made with
/// [`Bitmap::duplicate`] get a fresh id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitmapId(u64);

impl BitmapId {
    fn next() -> Self {
        Self(NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A premultiplied RGBA8 pixel buffer backed by a `vello_cpu` pixmap.
pub struct Bitmap {
    id: BitmapId,
    format: PixelFormat,
    pixmap: vello_cpu::Pixmap,
}

impl Bitmap {
    /// Allocate a transparent bitmap.
    ///
    /// Both dimensions must be in `1..=65535`.
    pub fn new(size: Size, format: PixelFormat) -> BlurResult<Self> {
        let (w, h) = checked_dims(size)?;
        Ok(Self {
            id: BitmapId::next(),
            format,
            pixmap: vello_cpu::Pixmap::new(w, h),
        })
    }

    /// Build a bitmap from tightly packed premultiplied RGBA8 bytes.
    pub fn from_premul_rgba8(size: Size, bytes: &[u8]) -> BlurResult<Self> {
        let (w, h) = checked_dims(size)?;
        if bytes.len() != size.area().saturating_mul(4) {
            return Err(BlurError::validation("bitmap byte len mismatch"));
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|px| {
                vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]])
            })
            .collect::<Vec<_>>();
        Ok(Self {
            id: BitmapId::next(),
            format: PixelFormat::Rgba8Premul,
            pixmap: vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true),
        })
    }

    /// Allocation identity.
    pub fn id(&self) -> BitmapId {
        self.id
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    /// Dimensions in pixels.
    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Raw premultiplied bytes, row-major, no padding.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    /// Mutable raw premultiplied bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    /// Premultiplied `[r, g, b, a]` at `(x, y)`, or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = ((y as usize) * (self.width() as usize) + x as usize) * 4;
        let d = self.data();
        Some([d[idx], d[idx + 1], d[idx + 2], d[idx + 3]])
    }

    /// Overwrite every pixel with `color`.
    pub fn erase(&mut self, color: Color) {
        let rgba = color.to_premul_rgba8();
        if rgba == [0, 0, 0, 0] {
            self.data_mut().fill(0);
            return;
        }
        for px in self.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Copy pixels into a new allocation with its own identity.
    pub fn duplicate(&self) -> BlurResult<Self> {
        Self::from_premul_rgba8(self.size(), self.data())
    }

    /// Copy `other`'s pixels into `self`. Sizes must match.
    pub fn copy_from(&mut self, other: &Self) -> BlurResult<()> {
        if self.size() != other.size() {
            return Err(BlurError::validation("copy_from expects equal bitmap sizes"));
        }
        self.data_mut().copy_from_slice(other.data());
        Ok(())
    }

    /// Snapshot the pixels as a paint usable by a `vello_cpu` render context.
    pub(crate) fn to_image(&self) -> BlurResult<vello_cpu::Image> {
        let copy = Self::from_premul_rgba8(self.size(), self.data())?;
        Ok(vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(copy.pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        })
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

fn checked_dims(size: Size) -> BlurResult<(u16, u16)> {
    if size.is_empty() {
        return Err(BlurError::validation(format!(
            "bitmap dimensions must be non-zero, got {}x{}",
            size.width, size.height
        )));
    }
    let w: u16 = size
        .width
        .try_into()
        .map_err(|_| BlurError::validation("bitmap width exceeds u16"))?;
    let h: u16 = size
        .height
        .try_into()
        .map_err(|_| BlurError::validation("bitmap height exceeds u16"))?;
    Ok((w, h))
}

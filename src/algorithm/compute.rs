//! Legacy GPU compute backend.
//!
//! The blur runs synchronously on the caller's thread through a [`ComputeContext`]. Contexts own
//! native device resources that another subsystem may invalidate at any time; the backend
//! reports that as [`BlurError::Backend`] and the controller keeps the unblurred snapshot.

use crate::algorithm::software::radius_px;
use crate::algorithm::{BackendKind, BlurAlgorithm};
use crate::bitmap::Bitmap;
use crate::foundation::core::Size;
use crate::foundation::error::{BlurError, BlurResult};

/// Smallest radius the compute kernel accepts.
pub const MIN_COMPUTE_RADIUS: u32 = 1;
/// Largest radius the compute kernel accepts.
pub const MAX_COMPUTE_RADIUS: u32 = 25;

/// A device able to blur premultiplied RGBA8 buffers.
pub trait ComputeContext: std::fmt::Debug {
    /// Whether the underlying device is still usable.
    fn is_valid(&self) -> bool;

    /// Prepare buffers for images of `size`. Called only when the size changes.
    fn allocate(&mut self, size: Size) -> BlurResult<()>;

    /// Blur `input` into `output`. Both hold `size` premultiplied RGBA8 pixels.
    fn blur(&mut self, input: &[u8], output: &mut [u8], size: Size, radius: u32) -> BlurResult<()>;

    /// Free device resources. Called at most once.
    fn release(&mut self);
}

/// Backend driving a [`ComputeContext`].
#[derive(Debug)]
pub struct ComputeBlur {
    ctx: Option<Box<dyn ComputeContext>>,
    in_place: bool,
    allocated: Option<Size>,
    scratch: Vec<u8>,
}

impl ComputeBlur {
    /// Wrap `ctx`. With `in_place == false`, every blur returns a freshly allocated buffer.
    pub fn new(ctx: Box<dyn ComputeContext>, in_place: bool) -> Self {
        Self {
            ctx: Some(ctx),
            in_place,
            allocated: None,
            scratch: Vec::new(),
        }
    }

    /// Size the device buffers were last allocated for.
    pub fn allocated_size(&self) -> Option<Size> {
        self.allocated
    }
}

impl BlurAlgorithm for ComputeBlur {
    fn kind(&self) -> BackendKind {
        BackendKind::LegacyCompute
    }

    fn blur(&mut self, bitmap: &mut Bitmap, radius: f32) -> BlurResult<Option<Bitmap>> {
        let r = radius_px(radius)?.clamp(MIN_COMPUTE_RADIUS, MAX_COMPUTE_RADIUS);
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(BlurError::backend("compute context already released"));
        };
        if !ctx.is_valid() {
            self.allocated = None;
            return Err(BlurError::backend("compute context was invalidated"));
        }

        let size = bitmap.size();
        if self.allocated != Some(size) {
            tracing::debug!(width = size.width, height = size.height, "allocating compute buffers");
            self.allocated = None;
            ctx.allocate(size)?;
            self.allocated = Some(size);
        }

        if self.in_place {
            self.scratch.clear();
            self.scratch.extend_from_slice(bitmap.data());
            ctx.blur(&self.scratch, bitmap.data_mut(), size, r)?;
            Ok(None)
        } else {
            let mut out = Bitmap::new(size, bitmap.format())?;
            ctx.blur(bitmap.data(), out.data_mut(), size, r)?;
            Ok(Some(out))
        }
    }

    fn can_modify_bitmap(&self) -> bool {
        self.in_place
    }

    fn teardown(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            tracing::debug!("releasing compute context");
            ctx.release();
        }
        self.allocated = None;
        self.scratch = Vec::new();
    }
}

impl Drop for ComputeBlur {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/algorithm/compute.rs"]
mod tests;

//! Identity backend.

use crate::algorithm::{BackendKind, BlurAlgorithm};
use crate::bitmap::Bitmap;
use crate::foundation::error::BlurResult;

/// Leaves pixels untouched. Used before a real backend is configured and on hosts that cannot
/// blur at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpBlur;

impl NoOpBlur {
    /// New pass-through backend.
    pub fn new() -> Self {
        Self
    }
}

impl BlurAlgorithm for NoOpBlur {
    fn kind(&self) -> BackendKind {
        BackendKind::NoOp
    }

    fn blur(&mut self, _bitmap: &mut Bitmap, _radius: f32) -> BlurResult<Option<Bitmap>> {
        Ok(None)
    }

    fn can_modify_bitmap(&self) -> bool {
        true
    }
}

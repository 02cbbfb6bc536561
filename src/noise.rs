//! Process-wide grain texture drawn over the blurred backdrop.

use std::sync::OnceLock;

use crate::bitmap::Bitmap;
use crate::foundation::core::Size;
use crate::foundation::error::BlurResult;
use crate::foundation::math::{hash_u32, mul_div255_u8};
use crate::host::DrawSurface;

/// Edge length of the square noise tile.
pub const NOISE_TILE_SIZE: u32 = 64;
/// Tile opacity, about 15%.
pub const NOISE_ALPHA: u8 = 38;

const NOISE_SEED: u64 = 0x6e6f_6973_65;

static NOISE_TILE: OnceLock<Option<Bitmap>> = OnceLock::new();

fn build_tile() -> BlurResult<Bitmap> {
    let size = Size::new(NOISE_TILE_SIZE, NOISE_TILE_SIZE);
    let mut bytes = Vec::with_capacity(size.area() * 4);
    for y in 0..NOISE_TILE_SIZE {
        for x in 0..NOISE_TILE_SIZE {
            let v = (hash_u32(NOISE_SEED, x, y) & 0xFF) as u16;
            let c = mul_div255_u8(v, u16::from(NOISE_ALPHA));
            bytes.extend_from_slice(&[c, c, c, NOISE_ALPHA]);
        }
    }
    Bitmap::from_premul_rgba8(size, &bytes)
}

/// The shared tile, built on first use. `None` if it could not be allocated.
pub fn noise_tile() -> Option<&'static Bitmap> {
    NOISE_TILE
        .get_or_init(|| {
            build_tile()
                .map_err(|e| tracing::warn!(error = %e, "noise tile unavailable"))
                .ok()
        })
        .as_ref()
}

/// Tile the noise texture over a `size` area at the surface's current transform.
pub fn apply(surface: &mut dyn DrawSurface, size: Size) {
    let Some(tile) = noise_tile() else {
        return;
    };
    for ty in (0..size.height).step_by(NOISE_TILE_SIZE as usize) {
        for tx in (0..size.width).step_by(NOISE_TILE_SIZE as usize) {
            surface.save();
            surface.translate(f64::from(tx), f64::from(ty));
            surface.draw_bitmap(tile);
            surface.restore();
        }
    }
}

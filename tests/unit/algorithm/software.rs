use super::*;
use crate::foundation::core::{Color, PixelFormat, Size};

fn solid(size: Size, color: Color) -> Bitmap {
    let mut b = Bitmap::new(size, PixelFormat::Rgba8Premul).unwrap();
    b.erase(color);
    b
}

fn half_split(w: u32, h: u32) -> Bitmap {
    let mut b = Bitmap::new(Size::new(w, h), PixelFormat::Rgba8Premul).unwrap();
    for (i, px) in b.data_mut().chunks_exact_mut(4).enumerate() {
        let x = (i as u32) % w;
        if x >= w / 2 {
            px.copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    b
}

#[test]
fn kernel_sums_to_one_in_q16_and_is_symmetric() {
    for r in [1u32, 3, 8, 25, 64] {
        let k = gaussian_kernel_q16(r, r as f32 / 2.0).unwrap();
        assert_eq!(k.len(), (2 * r + 1) as usize);
        assert_eq!(k.iter().map(|&w| u64::from(w)).sum::<u64>(), 65536);
        for i in 0..k.len() / 2 {
            assert_eq!(k[i], k[k.len() - 1 - i]);
        }
    }
    assert_eq!(gaussian_kernel_q16(0, 0.0).unwrap(), vec![65536]);
    assert!(gaussian_kernel_q16(2, 0.0).is_err());
}

#[test]
fn uniform_input_is_a_fixed_point() {
    let color = Color::from_argb(255, 40, 120, 200);
    let mut b = solid(Size::new(16, 8), color);
    let before = b.data().to_vec();
    let out = SoftwareBlur::new(true).blur(&mut b, 5.0).unwrap();
    assert!(out.is_none());
    assert_eq!(b.data(), &before[..]);
}

#[test]
fn edge_is_softened_in_place() {
    let mut b = half_split(16, 4);
    let id = b.id();
    SoftwareBlur::new(true).blur(&mut b, 4.0).unwrap();
    assert_eq!(b.id(), id);
    let left = b.pixel(7, 1).unwrap();
    let right = b.pixel(8, 1).unwrap();
    assert!(left[3] > 0 && left[3] < 255, "{left:?}");
    assert!(right[3] > 0 && right[3] < 255, "{right:?}");
    assert_eq!(b.pixel(0, 0), Some([0, 0, 0, 0]));
}

#[test]
fn out_of_place_returns_new_buffer_and_leaves_input() {
    let mut b = half_split(16, 4);
    let before = b.data().to_vec();
    let mut alg = SoftwareBlur::new(false);
    assert!(!alg.can_modify_bitmap());

    let out = alg.blur(&mut b, 4.0).unwrap().unwrap();
    assert_ne!(out.id(), b.id());
    assert_eq!(out.size(), b.size());
    assert_eq!(b.data(), &before[..]);
    assert_ne!(out.data(), &before[..]);

    let zero = alg.blur(&mut b, 0.0).unwrap().unwrap();
    assert_eq!(zero.data(), &before[..]);
}

#[test]
fn rejects_invalid_radius() {
    let mut b = solid(Size::new(2, 2), Color::WHITE);
    let mut alg = SoftwareBlur::new(true);
    assert!(matches!(alg.blur(&mut b, -1.0), Err(BlurError::Validation(_))));
    assert!(matches!(alg.blur(&mut b, f32::NAN), Err(BlurError::Validation(_))));
}

#[test]
fn caches_kernels_and_survives_teardown() {
    let mut alg = SoftwareBlur::new(true);
    let mut b = half_split(8, 8);
    alg.blur(&mut b, 3.0).unwrap();
    alg.blur(&mut b, 3.0).unwrap();
    assert_eq!(alg.kernel_cache.len(), 1);
    alg.teardown();
    alg.teardown();
    assert!(alg.kernel_cache.is_empty());
    alg.blur(&mut b, 3.0).unwrap();
}

use super::*;

fn scaler() -> SizeScaler {
    SizeScaler::new(8.0).unwrap()
}

#[test]
fn scales_and_returns_aligned_size_and_factor() {
    // (source w, source h, target w, target h, applied x factor)
    let cases: &[(u32, u32, u32, u32, f32)] = &[
        (64, 64, 64, 64, 1.0),
        (7, 7, 64, 64, 0.109375),
        (128, 128, 64, 64, 2.0),
        (1024, 1024, 128, 128, 8.0),
        (1024, 256, 128, 32, 8.0),
        (1000, 256, 128, 33, 7.8125),
        (900, 256, 128, 37, 7.03125),
        (900, 200, 128, 29, 7.03125),
        (907, 203, 128, 29, 7.0859375),
        (1080, 104, 192, 19, 5.625),
        (1080, 192, 192, 35, 5.625),
        (1080, 1149, 192, 205, 5.625),
    ];
    let s = scaler();
    for &(w, h, tw, th, fx) in cases {
        let r = s.scale(Size::new(w, h)).unwrap();
        assert_eq!((r.width, r.height), (tw, th), "size for {w}x{h}");
        assert_eq!(r.scale_x, fx, "x factor for {w}x{h}");
    }
}

#[test]
fn zero_size_detection_follows_downscale() {
    let s = scaler();
    assert!(s.is_zero_sized(0, 0));
    assert!(!s.is_zero_sized(1, 1));
    assert!(!s.is_zero_sized(8, 8));
    assert!(s.is_zero_sized(0, 100));
    assert!(s.is_zero_sized(100, 0));
    assert!(s.scale(Size::new(0, 100)).is_none());
}

#[test]
fn aligned_width_is_multiple_of_alignment() {
    for factor in [0.5f32, 1.0, 2.5, 6.0, 8.0, 13.0] {
        let s = SizeScaler::new(factor).unwrap();
        for w in (1u32..4000).step_by(37) {
            let aligned = s.align(s.downscale(w));
            assert_eq!(aligned % ROW_ALIGNMENT, 0, "w={w} factor={factor}");
            assert!(aligned >= ROW_ALIGNMENT);
        }
    }
}

#[test]
fn applied_factors_reproduce_source_within_a_pixel() {
    for factor in [1.0f32, 4.0, 6.0, 8.0] {
        let s = SizeScaler::new(factor).unwrap();
        for (w, h) in [(1u32, 1u32), (33, 700), (640, 480), (1080, 1920), (1999, 3)] {
            let r = s.scale(Size::new(w, h)).unwrap();
            let up_w = r.width as f32 * r.scale_x;
            let up_h = r.height as f32 * r.scale_y;
            assert!((up_w - w as f32).abs() <= 1.0, "w {w} -> {up_w}");
            assert!((up_h - h as f32).abs() <= 1.0, "h {h} -> {up_h}");
        }
    }
}

#[test]
fn alignment_can_be_disabled() {
    let s = SizeScaler::new(1.0).unwrap().with_alignment(None).unwrap();
    let r = s.scale(Size::new(301, 97)).unwrap();
    assert_eq!((r.width, r.height), (301, 97));
    assert_eq!(r.scale_x, 1.0);
}

#[test]
fn sixteen_pixel_alignment() {
    let s = SizeScaler::new(8.0).unwrap().with_alignment(Some(16)).unwrap();
    assert_eq!(s.align(s.downscale(1080)), 144);
    assert_eq!(s.align(1), 16);
}

#[test]
fn invalid_factors_fail_fast() {
    assert!(SizeScaler::new(0.0).is_err());
    assert!(SizeScaler::new(-1.0).is_err());
    assert!(SizeScaler::new(f32::NAN).is_err());
    assert!(SizeScaler::new(f32::INFINITY).is_err());
    assert!(SizeScaler::new(2.0).unwrap().with_alignment(Some(0)).is_err());
}

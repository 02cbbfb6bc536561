use super::*;

#[test]
fn mul_div255_rounds_to_nearest() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(128, 255), 128);
    assert_eq!(mul_div255_u8(0, 200), 0);
    assert_eq!(mul_div255_u8(255, 128), 128);
}

#[test]
fn over_transparent_src_keeps_dst() {
    assert_eq!(premul_over([1, 2, 3, 4], [200, 200, 200, 0]), [1, 2, 3, 4]);
}

#[test]
fn over_opaque_src_replaces_dst() {
    assert_eq!(premul_over([0, 0, 0, 255], [255, 0, 0, 255]), [255, 0, 0, 255]);
}

#[test]
fn over_half_alpha_blends() {
    let out = premul_over([0, 0, 255, 255], [128, 0, 0, 128]);
    assert_eq!(out[3], 255);
    assert_eq!(out[0], 128);
    assert_eq!(out[2], 127);
}

#[test]
fn over_in_place_rejects_mismatched_lengths() {
    let mut dst = vec![0u8; 8];
    assert!(premul_over_in_place(&mut dst, &[0u8; 4]).is_err());
}

#[test]
fn pixel_hash_is_deterministic_and_seeded() {
    assert_eq!(hash_u32(7, 3, 4), hash_u32(7, 3, 4));
    assert_ne!(hash_u32(7, 3, 4), hash_u32(8, 3, 4));
    assert_ne!(hash_u32(7, 3, 4), hash_u32(7, 4, 3));
}

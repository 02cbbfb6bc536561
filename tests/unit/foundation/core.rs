use super::*;

#[test]
fn color_channels_unpack_argb() {
    let c = Color(0x80FF_4020);
    assert_eq!(c.alpha(), 0x80);
    assert_eq!(c.red(), 0xFF);
    assert_eq!(c.green(), 0x40);
    assert_eq!(c.blue(), 0x20);
    assert_eq!(Color::from_argb(0x80, 0xFF, 0x40, 0x20), c);
}

#[test]
fn color_premultiplies_channels() {
    assert_eq!(Color::WHITE.to_premul_rgba8(), [255, 255, 255, 255]);
    assert_eq!(Color::TRANSPARENT.to_premul_rgba8(), [0, 0, 0, 0]);
    assert_eq!(
        Color::from_argb(128, 255, 0, 0).to_premul_rgba8(),
        [128, 0, 0, 128]
    );
}

#[test]
fn color_parses_hex_forms() {
    assert_eq!(Color::parse_hex("#FF0000").unwrap(), Color::from_rgb(255, 0, 0));
    assert_eq!(
        Color::parse_hex("40ffffff").unwrap(),
        Color::WHITE.with_alpha(0x40)
    );
    assert!(Color::parse_hex("#12345").is_err());
    assert!(Color::parse_hex("#GG0000").is_err());
}

#[test]
fn color_serde_accepts_hex_packed_and_arrays() {
    let c: Color = serde_json::from_str("\"#80102030\"").unwrap();
    assert_eq!(c, Color::from_argb(0x80, 0x10, 0x20, 0x30));
    let c: Color = serde_json::from_str("4278190080").unwrap();
    assert_eq!(c, Color::BLACK);
    let c: Color = serde_json::from_str("[10, 20, 30]").unwrap();
    assert_eq!(c, Color::from_rgb(10, 20, 30));
    assert_eq!(serde_json::to_string(&Color::WHITE).unwrap(), "\"#FFFFFFFF\"");
}

#[test]
fn size_emptiness() {
    assert!(Size::new(0, 10).is_empty());
    assert!(Size::new(10, 0).is_empty());
    assert!(!Size::new(1, 1).is_empty());
    assert_eq!(Size::new(4, 3).area(), 12);
}

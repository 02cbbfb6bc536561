use std::cell::Cell;

use super::*;
use crate::foundation::core::Point;
use crate::host::{DrawSurface, ViewTransform};

struct Node {
    size: (u32, u32),
    left_top: (f64, f64),
    screen: Cell<Point>,
    parent: Option<Rc<dyn View>>,
    transform: Cell<ViewTransform>,
}

impl Node {
    fn new(size: (u32, u32), screen: (f64, f64)) -> Self {
        Self {
            size,
            left_top: (0.0, 0.0),
            screen: Cell::new(Point::new(screen.0, screen.1)),
            parent: None,
            transform: Cell::new(ViewTransform::IDENTITY),
        }
    }

    fn child_of(parent: Rc<dyn View>, size: (u32, u32), left_top: (f64, f64)) -> Self {
        let p = parent.location_on_screen();
        Self {
            size,
            left_top,
            screen: Cell::new(Point::new(p.x + left_top.0, p.y + left_top.1)),
            parent: Some(parent),
            transform: Cell::new(ViewTransform::IDENTITY),
        }
    }
}

impl View for Node {
    fn width(&self) -> u32 {
        self.size.0
    }
    fn height(&self) -> u32 {
        self.size.1
    }
    fn left(&self) -> f64 {
        self.left_top.0
    }
    fn top(&self) -> f64 {
        self.left_top.1
    }
    fn parent(&self) -> Option<Rc<dyn View>> {
        self.parent.clone()
    }
    fn location_on_screen(&self) -> Point {
        self.screen.get()
    }
    fn render_transform(&self) -> ViewTransform {
        self.transform.get()
    }
    fn draw(&self, _surface: &mut dyn DrawSurface) {}
}

fn unit_scale(w: u32, h: u32) -> ScaleResult {
    ScaleResult {
        width: w,
        height: h,
        scale_x: 1.0,
        scale_y: 1.0,
    }
}

fn assert_point(actual: Point, x: f64, y: f64) {
    assert!(
        (actual.x - x).abs() < 1e-6 && (actual.y - y).abs() < 1e-6,
        "expected ({x}, {y}), got {actual:?}"
    );
}

#[test]
fn untransformed_view_maps_its_box_onto_the_snapshot() {
    let root: Rc<dyn View> = Rc::new(Node::new((400, 800), (0.0, 0.0)));
    let view: Rc<dyn View> = Rc::new(Node::new((80, 40), (100.0, 50.0)));
    let scale = ScaleResult {
        width: 40,
        height: 20,
        scale_x: 2.0,
        scale_y: 2.0,
    };
    let mut t = SnapshotTransform::default();
    let m = t.matrix(&root, &view, &scale).unwrap();
    assert_point(m * Point::new(100.0, 50.0), 0.0, 0.0);
    assert_point(m * Point::new(180.0, 90.0), 40.0, 20.0);
}

#[test]
fn offset_is_relative_to_the_content_root() {
    let root: Rc<dyn View> = Rc::new(Node::new((400, 800), (30.0, 60.0)));
    let view: Rc<dyn View> = Rc::new(Node::new((10, 10), (50.0, 70.0)));
    assert_eq!(screen_offset(root.as_ref(), view.as_ref()), Vec2::new(20.0, 10.0));
}

#[test]
fn descendant_offset_sums_the_parent_chain() {
    let root: Rc<dyn View> = Rc::new(Node::new((400, 800), (0.0, 0.0)));
    let mid: Rc<dyn View> = Rc::new(Node::child_of(Rc::clone(&root), (200, 200), (10.0, 20.0)));
    let view: Rc<dyn View> = Rc::new(Node::child_of(Rc::clone(&mid), (50, 50), (5.0, 7.0)));
    assert_eq!(descendant_offset(&root, &view), Some(Vec2::new(15.0, 27.0)));

    let mut t = SnapshotTransform::new(TransformMode::PerFrame, PositionStrategy::DescendantOffset);
    assert_eq!(t.offset(&root, &view), Vec2::new(15.0, 27.0));
    assert!(!t.fell_back());
}

#[test]
fn non_descendant_falls_back_to_screen_positions_once() {
    let root: Rc<dyn View> = Rc::new(Node::new((400, 800), (0.0, 0.0)));
    let stranger: Rc<dyn View> = Rc::new(Node::new((50, 50), (12.0, 34.0)));
    assert_eq!(descendant_offset(&root, &stranger), None);

    let mut t = SnapshotTransform::new(TransformMode::PerFrame, PositionStrategy::DescendantOffset);
    assert_eq!(t.offset(&root, &stranger), Vec2::new(12.0, 34.0));
    assert!(t.fell_back());
    assert_eq!(t.strategy(), PositionStrategy::AbsoluteScreen);

    t.set_strategy(PositionStrategy::DescendantOffset);
    assert!(!t.fell_back());
}

#[test]
fn rotated_view_samples_the_rotated_backdrop() {
    let root: Rc<dyn View> = Rc::new(Node::new((100, 100), (0.0, 0.0)));
    let node = Node::new((10, 10), (0.0, 0.0));
    node.transform.set(ViewTransform {
        rotation_deg: 180.0,
        ..ViewTransform::IDENTITY
    });
    let view: Rc<dyn View> = Rc::new(node);
    let m = SnapshotTransform::default()
        .matrix(&root, &view, &unit_scale(10, 10))
        .unwrap();
    assert_point(m * Point::new(0.0, 0.0), 10.0, 10.0);
    assert_point(m * Point::new(10.0, 10.0), 0.0, 0.0);
}

#[test]
fn translated_view_compensates_its_translation() {
    let root: Rc<dyn View> = Rc::new(Node::new((100, 100), (0.0, 0.0)));
    let node = Node::new((10, 10), (20.0, 0.0));
    node.transform.set(ViewTransform {
        translation: Vec2::new(5.0, 0.0),
        ..ViewTransform::IDENTITY
    });
    let view: Rc<dyn View> = Rc::new(node);
    let m = SnapshotTransform::default()
        .matrix(&root, &view, &unit_scale(10, 10))
        .unwrap();
    assert_point(m * Point::new(25.0, 0.0), 0.0, 0.0);
}

#[test]
fn collapsed_view_has_no_matrix() {
    let root: Rc<dyn View> = Rc::new(Node::new((100, 100), (0.0, 0.0)));
    let node = Node::new((10, 10), (0.0, 0.0));
    node.transform.set(ViewTransform {
        scale: Vec2::new(0.0, 1.0),
        ..ViewTransform::IDENTITY
    });
    let view: Rc<dyn View> = Rc::new(node);
    assert!(SnapshotTransform::default().matrix(&root, &view, &unit_scale(10, 10)).is_none());
}

#[test]
fn fixed_mode_reuses_the_first_matrix_until_invalidated() {
    let root: Rc<dyn View> = Rc::new(Node::new((100, 100), (0.0, 0.0)));
    let node = Rc::new(Node::new((10, 10), (10.0, 10.0)));
    let view: Rc<dyn View> = node.clone();
    let scale = unit_scale(10, 10);

    let mut fixed = SnapshotTransform::new(TransformMode::Fixed, PositionStrategy::AbsoluteScreen);
    let mut per_frame = SnapshotTransform::default();
    let first_fixed = fixed.matrix(&root, &view, &scale).unwrap();
    let first_live = per_frame.matrix(&root, &view, &scale).unwrap();
    assert_eq!(first_fixed, first_live);

    node.screen.set(Point::new(40.0, 10.0));
    assert_eq!(fixed.matrix(&root, &view, &scale).unwrap(), first_fixed);
    assert_ne!(per_frame.matrix(&root, &view, &scale).unwrap(), first_live);

    fixed.invalidate();
    assert_ne!(fixed.matrix(&root, &view, &scale).unwrap(), first_fixed);
}

//! Contracts the pipeline consumes from its host toolkit.
//!
//! The host owns the view tree, the output canvas and the frame loop. The pipeline only sees
//! these traits. Everything runs on the host's main thread, so shared collaborators are `Rc`
//! based and observers use interior mutability.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::algorithm::compositor::EffectNode;
use crate::bitmap::Bitmap;
use crate::canvas::SnapshotMarker;
use crate::foundation::core::{Affine, Color, Point, Rect, Size, Vec2};

/// A drawing target: the host's output canvas or a pipeline-owned snapshot.
pub trait DrawSurface {
    /// Target dimensions in pixels.
    fn size(&self) -> Size;

    /// Push the current transform.
    fn save(&mut self);

    /// Pop the transform pushed by the matching [`DrawSurface::save`].
    fn restore(&mut self);

    /// Pre-multiply the current transform by `transform`.
    fn concat(&mut self, transform: Affine);

    /// Translate subsequent drawing.
    fn translate(&mut self, dx: f64, dy: f64) {
        self.concat(Affine::translate((dx, dy)));
    }

    /// Scale subsequent drawing.
    fn scale(&mut self, sx: f64, sy: f64) {
        self.concat(Affine::scale_non_uniform(sx, sy));
    }

    /// Fill `rect` (in current coordinates) with a straight-alpha color.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Fill the whole target with `color`, ignoring the current transform.
    fn draw_color(&mut self, color: Color);

    /// Draw `bitmap` at the origin of the current transform with bilinear filtering.
    fn draw_bitmap(&mut self, bitmap: &Bitmap);

    /// Whether the target is backed by the host's hardware compositor.
    fn is_hardware_accelerated(&self) -> bool {
        false
    }

    /// Hand a recorded effect node to the host compositor.
    ///
    /// Only called when [`DrawSurface::is_hardware_accelerated`] returns `true`.
    fn draw_effect_node(&mut self, node: &EffectNode) {
        let _ = node;
    }

    /// Identity marker of a pipeline snapshot surface; `None` for host canvases.
    fn snapshot_marker(&self) -> Option<SnapshotMarker> {
        None
    }
}

/// Render transform a host applies to a view on top of its layout position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    /// Translation in pixels.
    pub translation: Vec2,
    /// Per-axis scale around the pivot.
    pub scale: Vec2,
    /// Clockwise rotation in degrees around the pivot.
    pub rotation_deg: f64,
    /// Pivot in view-local pixels; `None` means the view center.
    pub pivot: Option<Point>,
}

impl ViewTransform {
    /// No translation, unit scale, no rotation.
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        scale: Vec2::new(1.0, 1.0),
        rotation_deg: 0.0,
        pivot: None,
    };

    /// Return `true` when applying the transform would not move any pixel.
    pub fn is_identity(&self) -> bool {
        self.translation == Vec2::ZERO
            && self.scale == Vec2::new(1.0, 1.0)
            && self.rotation_deg == 0.0
    }

    /// Resolved pivot for a view of `size`.
    pub fn pivot_for(&self, size: Size) -> Point {
        self.pivot.unwrap_or_else(|| {
            Point::new(f64::from(size.width) / 2.0, f64::from(size.height) / 2.0)
        })
    }

    /// View-local to layout-position matrix.
    pub fn to_affine(&self, size: Size) -> Affine {
        let pivot = self.pivot_for(size).to_vec2();
        Affine::translate(self.translation)
            * Affine::translate(pivot)
            * Affine::rotate(self.rotation_deg.to_radians())
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-pivot)
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A node of the host view tree.
pub trait View {
    /// Laid-out width in pixels.
    fn width(&self) -> u32;

    /// Laid-out height in pixels.
    fn height(&self) -> u32;

    /// Left edge within the parent.
    fn left(&self) -> f64 {
        0.0
    }

    /// Top edge within the parent.
    fn top(&self) -> f64 {
        0.0
    }

    /// Parent node, if attached.
    fn parent(&self) -> Option<Rc<dyn View>> {
        None
    }

    /// Screen position of the layout box origin, excluding this view's own render transform.
    fn location_on_screen(&self) -> Point;

    /// Render transform currently applied to this view.
    fn render_transform(&self) -> ViewTransform {
        ViewTransform::IDENTITY
    }

    /// Draw this view and its subtree in local coordinates.
    fn draw(&self, surface: &mut dyn DrawSurface);

    /// Laid-out size.
    fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }
}

/// Something that can paint itself onto a surface, such as a window background.
pub trait Drawable {
    /// Paint onto `surface` using its current transform.
    fn draw(&self, surface: &mut dyn DrawSurface);
}

impl Drawable for Color {
    fn draw(&self, surface: &mut dyn DrawSurface) {
        surface.draw_color(*self);
    }
}

/// Frame-loop notifications a host delivers to registered listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostSignal {
    /// Once per frame, before the host commits a draw.
    PreDraw,
    /// After the host measured and positioned the view tree.
    LayoutComplete,
}

/// Receiver of [`HostSignal`]s.
pub trait SignalListener {
    /// Handle one signal. The return value is ignored for [`HostSignal::PreDraw`]; hosts always
    /// proceed with the frame.
    fn on_signal(&mut self, signal: HostSignal) -> bool;
}

/// Weak listener handle as stored by observers.
pub type ListenerRef = Weak<RefCell<dyn SignalListener>>;

/// Host-side registry of signal listeners.
pub trait ViewTreeObserver {
    /// Register `listener` for `signal`. Registering the same listener twice is a no-op.
    fn add_listener(&self, signal: HostSignal, listener: ListenerRef);

    /// Unregister `listener` from `signal`. Unknown listeners are ignored.
    fn remove_listener(&self, signal: HostSignal, listener: &ListenerRef);
}

/// In-memory [`ViewTreeObserver`] that dispatches signals on demand.
///
/// Suitable for headless hosts and tests; a windowing toolkit would forward its own frame
/// callbacks into [`SignalHub::dispatch`].
#[derive(Default)]
pub struct SignalHub {
    listeners: RefCell<Vec<(HostSignal, ListenerRef)>>,
}

impl SignalHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live listeners registered for `signal`.
    pub fn listener_count(&self, signal: HostSignal) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(s, l)| *s == signal && l.strong_count() > 0)
            .count()
    }

    /// Deliver `signal` to every live listener registered for it.
    ///
    /// Listeners may add or remove registrations while handling the signal. A listener that is
    /// already borrowed (re-entrant dispatch) is skipped.
    pub fn dispatch(&self, signal: HostSignal) {
        let targets: Vec<_> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|(_, l)| l.strong_count() > 0);
            listeners
                .iter()
                .filter(|(s, _)| *s == signal)
                .filter_map(|(_, l)| l.upgrade())
                .collect()
        };
        for listener in targets {
            let Ok(mut listener) = listener.try_borrow_mut() else {
                tracing::trace!(?signal, "skipping re-entrant listener");
                continue;
            };
            listener.on_signal(signal);
        }
    }
}

impl ViewTreeObserver for SignalHub {
    fn add_listener(&self, signal: HostSignal, listener: ListenerRef) {
        let mut listeners = self.listeners.borrow_mut();
        if listeners
            .iter()
            .any(|(s, l)| *s == signal && Weak::ptr_eq(l, &listener))
        {
            return;
        }
        listeners.push((signal, listener));
    }

    fn remove_listener(&self, signal: HostSignal, listener: &ListenerRef) {
        self.listeners
            .borrow_mut()
            .retain(|(s, l)| !(*s == signal && Weak::ptr_eq(l, listener)));
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("pre_draw", &self.listener_count(HostSignal::PreDraw))
            .field("layout", &self.listener_count(HostSignal::LayoutComplete))
            .finish()
    }
}

/// Whether two view handles point at the same node.
pub fn same_view(a: &Rc<dyn View>, b: &Rc<dyn View>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

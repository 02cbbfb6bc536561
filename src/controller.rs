//! The snapshot, blur and composite state machine.
//!
//! ```text
//! Uninitialized --layout, non-zero size--> Active --size change--> Uninitialized
//!       \                                    |
//!        `--------------- destroy ------------+--> Destroyed
//! ```
//!
//! While `Active`, every pre-draw signal recaptures the content root into a downscaled
//! [`SnapshotCanvas`], runs the [`BlurAlgorithm`], and keeps the result for the next
//! [`BlurController::draw`]. A freshly allocated snapshot is first captured on the next
//! pre-draw, even with auto-update off, so the host has finished installing the blur view
//! before the content root is drawn into it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::algorithm::{
    BackendKind, BlurAlgorithm, DEFAULT_BLUR_RADIUS, create_algorithm, size_scaler,
};
use crate::bitmap::Bitmap;
use crate::canvas::{SnapshotCanvas, SnapshotMarker};
use crate::foundation::core::{Color, Rect};
use crate::foundation::error::{BlurError, BlurResult};
use crate::host::{
    DrawSurface, Drawable, HostSignal, ListenerRef, SignalListener, View, ViewTreeObserver,
};
use crate::marshal::{SettingChange, SettingsQueue, SettingsSender};
use crate::scale::{ScaleResult, SizeScaler};
use crate::transform::{PositionStrategy, SnapshotTransform, TransformMode};

/// Externally visible lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// No snapshot buffer; waiting for a non-zero layout.
    Uninitialized,
    /// Snapshot allocated; recapturing on pre-draw.
    Active,
    /// Terminal. Every resource is released.
    Destroyed,
}

/// Mutable blur settings, read on every recapture and composite.
#[derive(Clone)]
pub struct BlurParameters {
    /// Radius passed to the backend, in snapshot pixels.
    pub radius: f32,
    /// Flat color drawn over the blurred backdrop. Transparent disables it.
    pub overlay_color: Color,
    /// Recapture on every pre-draw signal.
    pub auto_update: bool,
    /// Master switch. When off the controller neither recaptures nor draws.
    pub blur_enabled: bool,
    /// Backdrop painted into the snapshot before the content root.
    pub frame_clear: Option<Rc<dyn Drawable>>,
    /// Draw the grain texture over the overlay color.
    pub noise: bool,
}

impl Default for BlurParameters {
    fn default() -> Self {
        Self {
            radius: DEFAULT_BLUR_RADIUS,
            overlay_color: Color::TRANSPARENT,
            auto_update: true,
            blur_enabled: true,
            frame_clear: None,
            noise: false,
        }
    }
}

impl std::fmt::Debug for BlurParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurParameters")
            .field("radius", &self.radius)
            .field("overlay_color", &self.overlay_color)
            .field("auto_update", &self.auto_update)
            .field("blur_enabled", &self.blur_enabled)
            .field("frame_clear", &self.frame_clear.is_some())
            .field("noise", &self.noise)
            .finish()
    }
}

/// Construction-time choices.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerOptions {
    /// Downscale factor overriding the backend's preference.
    pub scale_factor: Option<f32>,
    /// When the snapshot matrix is recomputed.
    pub transform_mode: TransformMode,
    /// How the blur view's offset from the content root is measured.
    pub position_strategy: PositionStrategy,
}

/// Diagnostic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecaptureStats {
    /// Snapshots redrawn from the content root.
    pub recaptures: u64,
    /// Blurred snapshots drawn onto host canvases.
    pub composites: u64,
    /// Backend errors absorbed while blurring or rendering.
    pub backend_failures: u64,
    /// Draw calls refused because the target was a snapshot surface.
    pub skipped_recursive_draws: u64,
    /// Initialisations postponed because the view was zero-sized.
    pub deferred_inits: u64,
}

#[derive(Debug)]
struct ActiveState {
    snapshot: SnapshotCanvas,
    scale: ScaleResult,
    /// Allocated but not captured yet.
    stale: bool,
}

#[derive(Debug)]
enum Phase {
    Uninitialized,
    Active(ActiveState),
    Destroyed,
}

/// Owns one snapshot buffer and one backend for one blur view.
///
/// Always lives in an `Rc<RefCell<_>>` so it can register itself with the host's
/// [`ViewTreeObserver`]. The view and content root are held weakly: the host tree owns them,
/// and typically owns this controller too.
pub struct BlurController {
    self_ref: Weak<RefCell<BlurController>>,
    view: Weak<dyn View>,
    root: Weak<dyn View>,
    observer: Rc<dyn ViewTreeObserver>,
    algorithm: Box<dyn BlurAlgorithm>,
    scale_override: Option<f32>,
    scaler: SizeScaler,
    params: BlurParameters,
    transform: SnapshotTransform,
    phase: Phase,
    pre_draw_registered: bool,
    layout_registered: bool,
    stats: RecaptureStats,
    settings: SettingsQueue,
}

impl BlurController {
    /// Start the pipeline for `view`, blurring whatever `root` draws behind it.
    ///
    /// Allocates the snapshot right away when `view` already has a size; otherwise waits for
    /// the host's layout signal. Nothing is captured until the first pre-draw signal or
    /// [`BlurController::update_blur`]. Once either view is dropped the controller stops
    /// recapturing and compositing.
    pub fn new(
        view: Rc<dyn View>,
        root: Rc<dyn View>,
        observer: Rc<dyn ViewTreeObserver>,
        algorithm: Box<dyn BlurAlgorithm>,
        options: ControllerOptions,
    ) -> BlurResult<Rc<RefCell<Self>>> {
        let scaler = scaler_for(algorithm.as_ref(), options.scale_factor)?;
        let controller = Rc::new_cyclic(|weak| {
            RefCell::new(Self {
                self_ref: weak.clone(),
                view: Rc::downgrade(&view),
                root: Rc::downgrade(&root),
                observer,
                algorithm,
                scale_override: options.scale_factor,
                scaler,
                params: BlurParameters::default(),
                transform: SnapshotTransform::new(
                    options.transform_mode,
                    options.position_strategy,
                ),
                phase: Phase::Uninitialized,
                pre_draw_registered: false,
                layout_registered: false,
                stats: RecaptureStats::default(),
                settings: SettingsQueue::new(),
            })
        });
        controller.borrow_mut().init();
        Ok(controller)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        match self.phase {
            Phase::Uninitialized => ControllerState::Uninitialized,
            Phase::Active(_) => ControllerState::Active,
            Phase::Destroyed => ControllerState::Destroyed,
        }
    }

    /// Current settings.
    pub fn params(&self) -> &BlurParameters {
        &self.params
    }

    /// Counters since construction.
    pub fn stats(&self) -> RecaptureStats {
        self.stats
    }

    /// Active backend.
    pub fn algorithm_kind(&self) -> BackendKind {
        self.algorithm.kind()
    }

    /// Sizing in effect.
    pub fn scaler(&self) -> SizeScaler {
        self.scaler
    }

    /// Snapshot sizing, while active.
    pub fn scale_result(&self) -> Option<ScaleResult> {
        match &self.phase {
            Phase::Active(a) => Some(a.scale),
            _ => None,
        }
    }

    /// Buffer the next composite will draw, while active.
    pub fn snapshot_bitmap(&self) -> Option<&Bitmap> {
        match &self.phase {
            Phase::Active(a) => Some(a.snapshot.bitmap()),
            _ => None,
        }
    }

    /// Identity of the snapshot surface, while active.
    pub fn snapshot_marker(&self) -> Option<SnapshotMarker> {
        match &self.phase {
            Phase::Active(a) => Some(a.snapshot.marker()),
            _ => None,
        }
    }

    /// Transform state, including whether the position strategy fell back.
    pub fn transform(&self) -> &SnapshotTransform {
        &self.transform
    }

    /// Handle other threads can use to queue setting changes.
    pub fn settings_sender(&self) -> SettingsSender {
        self.settings.sender()
    }

    fn ensure_alive(&self) -> BlurResult<()> {
        match self.phase {
            Phase::Destroyed => Err(BlurError::Destroyed),
            _ => Ok(()),
        }
    }

    fn subscribe(&mut self, signal: HostSignal, on: bool) {
        let registered = match signal {
            HostSignal::PreDraw => &mut self.pre_draw_registered,
            HostSignal::LayoutComplete => &mut self.layout_registered,
        };
        if *registered == on {
            return;
        }
        *registered = on;
        let listener = self.self_ref.clone() as ListenerRef;
        if on {
            self.observer.add_listener(signal, listener);
        } else {
            self.observer.remove_listener(signal, &listener);
        }
    }

    fn needs_capture(&self) -> bool {
        match &self.phase {
            Phase::Active(a) => self.params.auto_update || a.stale,
            _ => false,
        }
    }

    fn sync_pre_draw(&mut self) {
        let want = self.params.blur_enabled && self.needs_capture();
        self.subscribe(HostSignal::PreDraw, want);
    }

    fn init(&mut self) {
        if matches!(self.phase, Phase::Destroyed) {
            return;
        }
        self.phase = Phase::Uninitialized;
        self.transform.invalidate();

        let size = self.view.upgrade().map(|v| v.size()).unwrap_or_default();
        let Some(scale) = self.scaler.scale(size) else {
            tracing::debug!(
                width = size.width,
                height = size.height,
                "view is zero-sized; deferring init"
            );
            self.stats.deferred_inits += 1;
            self.subscribe(HostSignal::LayoutComplete, true);
            self.sync_pre_draw();
            return;
        };

        let snapshot = Bitmap::new(scale.size(), self.algorithm.preferred_pixel_format())
            .and_then(SnapshotCanvas::new);
        let snapshot = match snapshot {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not allocate snapshot; deferring init");
                self.stats.deferred_inits += 1;
                self.subscribe(HostSignal::LayoutComplete, true);
                self.sync_pre_draw();
                return;
            }
        };
        tracing::debug!(
            width = scale.width,
            height = scale.height,
            scale_x = scale.scale_x,
            scale_y = scale.scale_y,
            backend = ?self.algorithm.kind(),
            "snapshot allocated"
        );
        self.phase = Phase::Active(ActiveState {
            snapshot,
            scale,
            stale: true,
        });
        self.subscribe(HostSignal::LayoutComplete, false);
        self.sync_pre_draw();
    }

    /// Host layout finished. Completes a deferred initialisation.
    pub fn on_layout(&mut self) {
        if matches!(self.phase, Phase::Uninitialized) {
            self.init();
        }
    }

    /// Host reported a new size for the blur view. Reallocates the snapshot.
    pub fn update_view_size(&mut self) {
        if matches!(self.phase, Phase::Destroyed) {
            return;
        }
        tracing::debug!("view size changed; reinitialising");
        self.init();
    }

    /// Pre-draw signal: apply queued settings, then recapture if auto-update is on or the
    /// snapshot has never been captured.
    pub fn on_pre_draw(&mut self) {
        self.apply_pending();
        if self.needs_capture() {
            self.update_blur();
        }
    }

    /// Recapture and blur now, regardless of auto-update.
    ///
    /// No-op unless active and enabled.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn update_blur(&mut self) {
        if !self.params.blur_enabled {
            return;
        }
        let (Some(root), Some(view)) = (self.root.upgrade(), self.view.upgrade()) else {
            return;
        };
        let Phase::Active(active) = &mut self.phase else {
            return;
        };

        active.snapshot.erase(Color::TRANSPARENT);
        if let Some(clear) = &self.params.frame_clear {
            clear.draw(&mut active.snapshot);
        }

        let marker = active.snapshot.marker();
        let Some(matrix) = self.transform.matrix(&root, &view, &active.scale) else {
            tracing::trace!("blur view transform is singular; snapshot left clear");
            return;
        };
        active.snapshot.save();
        active.snapshot.concat(matrix);
        root.draw(&mut active.snapshot);
        active.snapshot.restore();

        // Settings posted while the tree was drawing may have destroyed or reinitialised us.
        self.apply_pending();
        let Phase::Active(active) = &mut self.phase else {
            tracing::debug!("controller destroyed during recapture; abandoning");
            return;
        };
        if active.snapshot.marker() != marker {
            return;
        }
        if let Err(e) = active.snapshot.flush() {
            tracing::warn!(error = %e, "snapshot flush failed");
            self.stats.backend_failures += 1;
            return;
        }
        self.stats.recaptures += 1;
        let was_stale = std::mem::replace(&mut active.stale, false);

        // The returned buffer decides where the result lives; the hint must agree with it.
        let in_place = self.algorithm.can_modify_bitmap();
        match self.algorithm.blur(active.snapshot.bitmap_mut(), self.params.radius) {
            Ok(None) => {
                debug_assert!(in_place, "out-of-place backend returned no buffer");
            }
            Ok(Some(blurred)) => {
                debug_assert!(!in_place, "in-place backend returned a new buffer");
                if let Err(e) = active.snapshot.set_bitmap(blurred) {
                    tracing::warn!(error = %e, "could not adopt blurred buffer");
                    self.stats.backend_failures += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = ?self.algorithm.kind(),
                    "blur failed; showing unblurred snapshot"
                );
                self.stats.backend_failures += 1;
            }
        }
        if was_stale {
            self.sync_pre_draw();
        }
    }

    /// Composite the blurred snapshot onto `canvas` in view-local coordinates.
    ///
    /// Returns `false` when `canvas` is a snapshot surface, telling the caller not to draw its
    /// children into it either. Returns `true` otherwise.
    pub fn draw(&mut self, canvas: &mut dyn DrawSurface) -> bool {
        if matches!(self.phase, Phase::Destroyed) || !self.params.blur_enabled {
            return true;
        }
        if canvas.snapshot_marker().is_some() {
            self.stats.skipped_recursive_draws += 1;
            return false;
        }
        let Phase::Active(active) = &self.phase else {
            return true;
        };
        let Some(view) = self.view.upgrade().map(|v| v.size()) else {
            return true;
        };

        let bitmap = active.snapshot.bitmap();
        let sx = f64::from(view.width) / f64::from(bitmap.width());
        let sy = f64::from(view.height) / f64::from(bitmap.height());
        canvas.save();
        canvas.scale(sx, sy);
        if let Err(e) = self.algorithm.render(canvas, bitmap) {
            tracing::warn!(error = %e, "backend render failed; drawing snapshot directly");
            self.stats.backend_failures += 1;
            canvas.draw_bitmap(bitmap);
        }
        canvas.restore();

        let bounds = Rect::new(0.0, 0.0, f64::from(view.width), f64::from(view.height));
        if !self.params.overlay_color.is_transparent() {
            canvas.fill_rect(bounds, self.params.overlay_color);
        }
        if self.params.noise {
            crate::noise::apply(canvas, view);
        }
        self.stats.composites += 1;
        true
    }

    /// Release everything. Idempotent; later lifecycle calls are no-ops.
    pub fn destroy(&mut self) {
        if matches!(self.phase, Phase::Destroyed) {
            return;
        }
        self.subscribe(HostSignal::PreDraw, false);
        self.subscribe(HostSignal::LayoutComplete, false);
        self.algorithm.teardown();
        self.phase = Phase::Destroyed;
        tracing::debug!("controller destroyed");
    }

    /// Apply every change queued through [`BlurController::settings_sender`].
    pub fn apply_pending(&mut self) {
        while let Some(change) = self.settings.next_pending() {
            if let Err(e) = self.apply_change(change) {
                tracing::warn!(error = %e, ?change, "dropping queued setting");
            }
        }
    }

    fn apply_change(&mut self, change: SettingChange) -> BlurResult<()> {
        match change {
            SettingChange::BlurRadius(r) => self.set_blur_radius(r).map(drop),
            SettingChange::OverlayColor(c) => self.set_overlay_color(c).map(drop),
            SettingChange::BlurEnabled(on) => self.set_blur_enabled(on).map(drop),
            SettingChange::AutoUpdate(on) => self.set_blur_auto_update(on).map(drop),
            SettingChange::Noise(on) => self.set_noise_enabled(on).map(drop),
            SettingChange::Algorithm(kind) => {
                self.ensure_alive()?;
                let algorithm = create_algorithm(kind, &Default::default())?;
                self.set_blur_algorithm(algorithm).map(drop)
            }
            SettingChange::TransformMode(m) => self.set_transform_mode(m).map(drop),
            SettingChange::PositionStrategy(s) => self.set_position_strategy(s).map(drop),
            SettingChange::ViewResized => {
                self.update_view_size();
                Ok(())
            }
            SettingChange::Destroy => {
                self.destroy();
                Ok(())
            }
        }
    }

    /// Set the blur radius. Must be finite and non-negative.
    pub fn set_blur_radius(&mut self, radius: f32) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        if !radius.is_finite() || radius < 0.0 {
            return Err(BlurError::validation(format!(
                "blur radius must be finite and >= 0, got {radius}"
            )));
        }
        self.params.radius = radius;
        Ok(self)
    }

    /// Set the overlay color.
    pub fn set_overlay_color(&mut self, color: Color) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.params.overlay_color = color;
        Ok(self)
    }

    /// Set or clear the frame-clear backdrop.
    pub fn set_frame_clear_drawable(
        &mut self,
        drawable: Option<Rc<dyn Drawable>>,
    ) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.params.frame_clear = drawable;
        Ok(self)
    }

    /// Enable or disable blurring.
    pub fn set_blur_enabled(&mut self, enabled: bool) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.params.blur_enabled = enabled;
        self.sync_pre_draw();
        Ok(self)
    }

    /// Enable or disable recapture on every pre-draw.
    pub fn set_blur_auto_update(&mut self, enabled: bool) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.params.auto_update = enabled;
        self.sync_pre_draw();
        Ok(self)
    }

    /// Enable or disable the noise overlay.
    pub fn set_noise_enabled(&mut self, enabled: bool) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.params.noise = enabled;
        Ok(self)
    }

    /// Change when the snapshot matrix is recomputed.
    pub fn set_transform_mode(&mut self, mode: TransformMode) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.transform.set_mode(mode);
        Ok(self)
    }

    /// Change how the blur view's offset is measured.
    pub fn set_position_strategy(&mut self, strategy: PositionStrategy) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        self.transform.set_strategy(strategy);
        Ok(self)
    }

    /// Replace the backend. The previous one is torn down first.
    ///
    /// The snapshot is reallocated when the new backend wants different sizing or pixels.
    pub fn set_blur_algorithm(
        &mut self,
        algorithm: Box<dyn BlurAlgorithm>,
    ) -> BlurResult<&mut Self> {
        self.ensure_alive()?;
        let scaler = scaler_for(algorithm.as_ref(), self.scale_override)?;
        let format_changed =
            algorithm.preferred_pixel_format() != self.algorithm.preferred_pixel_format();
        tracing::debug!(
            from = ?self.algorithm.kind(),
            to = ?algorithm.kind(),
            "swapping blur backend"
        );

        self.algorithm.teardown();
        self.algorithm = algorithm;
        if scaler != self.scaler || format_changed {
            self.scaler = scaler;
            if matches!(self.phase, Phase::Active(_)) {
                self.init();
            }
        }
        Ok(self)
    }
}

fn scaler_for(
    algorithm: &dyn BlurAlgorithm,
    scale_override: Option<f32>,
) -> BlurResult<SizeScaler> {
    match scale_override {
        Some(factor) => SizeScaler::new(factor)?.with_alignment(algorithm.row_alignment()),
        None => size_scaler(algorithm),
    }
}

impl SignalListener for BlurController {
    fn on_signal(&mut self, signal: HostSignal) -> bool {
        match signal {
            HostSignal::PreDraw => self.on_pre_draw(),
            HostSignal::LayoutComplete => self.on_layout(),
        }
        true
    }
}

impl Drop for BlurController {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for BlurController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurController")
            .field("state", &self.state())
            .field("algorithm", &self.algorithm)
            .field("scaler", &self.scaler)
            .field("params", &self.params)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../tests/unit/controller/state_machine.rs"]
mod tests;

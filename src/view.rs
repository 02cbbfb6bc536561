//! User-facing facade: one blur surface, at most one controller.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use crate::algorithm::{
    AlgorithmSettings, BackendKind, BlurAlgorithm, CapabilityTier, create_algorithm, select_backend,
};
use crate::controller::{BlurController, ControllerOptions, ControllerState, RecaptureStats};
use crate::foundation::core::Color;
use crate::foundation::error::{BlurError, BlurResult};
use crate::host::{DrawSurface, Drawable, View, ViewTreeObserver};
use crate::marshal::{SettingChange, SettingsSender};
use crate::transform::{PositionStrategy, TransformMode};

/// Arguments for [`BlurView::setup_with`].
#[derive(Debug, Default)]
pub struct SetupOptions {
    /// Backend to use. `None` selects one from the view's [`CapabilityTier`].
    pub algorithm: Option<Box<dyn BlurAlgorithm>>,
    /// Settings for a backend created from the tier.
    pub settings: AlgorithmSettings,
    /// Controller construction options.
    pub controller: ControllerOptions,
}

/// Chaining handle onto a live controller, returned by [`BlurView::setup_with`].
#[derive(Clone, Debug)]
pub struct BlurHandle {
    controller: Rc<RefCell<BlurController>>,
}

impl BlurHandle {
    fn borrow(&self) -> BlurResult<RefMut<'_, BlurController>> {
        self.controller.try_borrow_mut().map_err(|_| {
            BlurError::validation("controller is busy; queue the change through settings_sender")
        })
    }

    /// Set the blur radius.
    pub fn set_blur_radius(&self, radius: f32) -> BlurResult<&Self> {
        self.borrow()?.set_blur_radius(radius)?;
        Ok(self)
    }

    /// Set the overlay color.
    pub fn set_overlay_color(&self, color: Color) -> BlurResult<&Self> {
        self.borrow()?.set_overlay_color(color)?;
        Ok(self)
    }

    /// Set or clear the frame-clear backdrop.
    pub fn set_frame_clear_drawable(
        &self,
        drawable: Option<Rc<dyn Drawable>>,
    ) -> BlurResult<&Self> {
        self.borrow()?.set_frame_clear_drawable(drawable)?;
        Ok(self)
    }

    /// Enable or disable blurring.
    pub fn set_blur_enabled(&self, enabled: bool) -> BlurResult<&Self> {
        self.borrow()?.set_blur_enabled(enabled)?;
        Ok(self)
    }

    /// Enable or disable recapture on every frame.
    pub fn set_blur_auto_update(&self, enabled: bool) -> BlurResult<&Self> {
        self.borrow()?.set_blur_auto_update(enabled)?;
        Ok(self)
    }

    /// Enable or disable the noise overlay.
    pub fn set_noise_enabled(&self, enabled: bool) -> BlurResult<&Self> {
        self.borrow()?.set_noise_enabled(enabled)?;
        Ok(self)
    }

    /// Replace the backend.
    pub fn set_blur_algorithm(&self, algorithm: Box<dyn BlurAlgorithm>) -> BlurResult<&Self> {
        self.borrow()?.set_blur_algorithm(algorithm)?;
        Ok(self)
    }

    /// Change when the snapshot matrix is recomputed.
    pub fn set_transform_mode(&self, mode: TransformMode) -> BlurResult<&Self> {
        self.borrow()?.set_transform_mode(mode)?;
        Ok(self)
    }

    /// Change how the blur view's offset is measured.
    pub fn set_position_strategy(&self, strategy: PositionStrategy) -> BlurResult<&Self> {
        self.borrow()?.set_position_strategy(strategy)?;
        Ok(self)
    }

    /// Recapture now.
    pub fn update_blur(&self) -> BlurResult<&Self> {
        self.borrow()?.update_blur();
        Ok(self)
    }

    /// Lifecycle state of the controller.
    pub fn state(&self) -> ControllerState {
        self.controller.borrow().state()
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> RecaptureStats {
        self.controller.borrow().stats()
    }

    /// Sender for changes made off the main thread.
    pub fn settings_sender(&self) -> SettingsSender {
        self.controller.borrow().settings_sender()
    }

    /// The controller itself.
    pub fn controller(&self) -> &Rc<RefCell<BlurController>> {
        &self.controller
    }
}

/// A blur surface as seen by the host toolkit.
///
/// Before [`BlurView::setup_with`] it behaves as a stub: nothing is captured and
/// [`BlurView::draw`] always lets the host draw children.
pub struct BlurView {
    node: Weak<dyn View>,
    observer: Rc<dyn ViewTreeObserver>,
    tier: CapabilityTier,
    controller: Option<Rc<RefCell<BlurController>>>,
    sender: Option<SettingsSender>,
}

impl BlurView {
    /// Facade for the host `node`. Backend selection for `tier` happens at setup.
    pub fn new(
        node: &Rc<dyn View>,
        observer: Rc<dyn ViewTreeObserver>,
        tier: CapabilityTier,
    ) -> Self {
        Self {
            node: Rc::downgrade(node),
            observer,
            tier,
            controller: None,
            sender: None,
        }
    }

    /// Backend kind the view's capability tier maps to.
    pub fn default_backend(&self) -> BackendKind {
        select_backend(self.tier)
    }

    /// Start blurring `root` behind this view. Destroys any previous controller.
    pub fn setup_with(
        &mut self,
        root: Rc<dyn View>,
        options: SetupOptions,
    ) -> BlurResult<BlurHandle> {
        let node = self
            .node
            .upgrade()
            .ok_or_else(|| BlurError::validation("blur view node was dropped before setup"))?;
        let algorithm = match options.algorithm {
            Some(a) => a,
            None => self.create_default_algorithm(&options.settings)?,
        };

        self.release();
        let controller = BlurController::new(
            node,
            root,
            Rc::clone(&self.observer),
            algorithm,
            options.controller,
        )?;
        self.sender = Some(controller.borrow().settings_sender());
        self.controller = Some(Rc::clone(&controller));
        Ok(BlurHandle { controller })
    }

    fn create_default_algorithm(
        &self,
        settings: &AlgorithmSettings,
    ) -> BlurResult<Box<dyn BlurAlgorithm>> {
        let kind = self.default_backend();
        match create_algorithm(kind, settings) {
            Err(BlurError::Unavailable(reason)) => {
                tracing::warn!(?kind, %reason, "backend unavailable; using software blur");
                create_algorithm(BackendKind::Software, settings)
            }
            other => other,
        }
    }

    /// Handle onto the live controller, if set up.
    pub fn handle(&self) -> Option<BlurHandle> {
        self.controller.as_ref().map(|c| BlurHandle {
            controller: Rc::clone(c),
        })
    }

    /// Lifecycle state; a stub reports [`ControllerState::Uninitialized`].
    pub fn state(&self) -> ControllerState {
        match &self.controller {
            Some(c) => c.try_borrow().map(|c| c.state()).unwrap_or(ControllerState::Active),
            None => ControllerState::Uninitialized,
        }
    }

    /// Host draw pass for this view. Returns whether the host should draw children.
    ///
    /// A draw reaching the facade while its own controller is recapturing targets that
    /// controller's snapshot, so it is refused without re-entering the controller.
    pub fn draw(&self, canvas: &mut dyn DrawSurface) -> bool {
        let Some(controller) = &self.controller else {
            return true;
        };
        match controller.try_borrow_mut() {
            Ok(mut c) => c.draw(canvas),
            Err(_) => canvas.snapshot_marker().is_none(),
        }
    }

    /// Host reported a new size.
    ///
    /// While the controller is recapturing the resize is queued and applied once the tree
    /// has been drawn.
    pub fn on_size_changed(&self) {
        let Some(controller) = &self.controller else {
            return;
        };
        match controller.try_borrow_mut() {
            Ok(mut c) => c.update_view_size(),
            Err(_) => {
                tracing::trace!("controller busy; queueing resize");
                if let Some(sender) = &self.sender {
                    let _ = sender.post(SettingChange::ViewResized);
                }
            }
        }
    }

    /// View left the window. Destroys the controller.
    pub fn on_detached(&mut self) {
        self.release();
    }

    /// Set the overlay color. No-op on a stub.
    pub fn set_overlay_color(&self, color: Color) -> BlurResult<&Self> {
        if let Some(h) = self.handle() {
            h.set_overlay_color(color)?;
        }
        Ok(self)
    }

    /// Set the blur radius. No-op on a stub.
    pub fn set_blur_radius(&self, radius: f32) -> BlurResult<&Self> {
        if let Some(h) = self.handle() {
            h.set_blur_radius(radius)?;
        }
        Ok(self)
    }

    /// Enable or disable blurring. No-op on a stub.
    pub fn set_blur_enabled(&self, enabled: bool) -> BlurResult<&Self> {
        if let Some(h) = self.handle() {
            h.set_blur_enabled(enabled)?;
        }
        Ok(self)
    }

    /// Enable or disable per-frame recapture. No-op on a stub.
    pub fn set_blur_auto_update(&self, enabled: bool) -> BlurResult<&Self> {
        if let Some(h) = self.handle() {
            h.set_blur_auto_update(enabled)?;
        }
        Ok(self)
    }

    fn release(&mut self) {
        let sender = self.sender.take();
        let Some(controller) = self.controller.take() else {
            return;
        };
        match controller.try_borrow_mut() {
            Ok(mut c) => c.destroy(),
            Err(_) => {
                if let Some(sender) = sender {
                    let _ = sender.post(SettingChange::Destroy);
                }
            }
        };
    }
}

impl Drop for BlurView {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BlurView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurView")
            .field("tier", &self.tier)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

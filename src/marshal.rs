//! Main-thread marshalling for settings changed from other threads.
//!
//! The controller is not `Send`. Background threads hold a [`SettingsSender`] and post
//! [`SettingChange`]s; the controller applies them at the start of its next pre-draw pass.

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};

use crate::algorithm::BackendKind;
use crate::foundation::core::Color;
use crate::foundation::error::{BlurError, BlurResult};
use crate::transform::{PositionStrategy, TransformMode};

/// One deferred controller mutation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettingChange {
    /// Change the blur radius.
    BlurRadius(f32),
    /// Change the overlay color.
    OverlayColor(Color),
    /// Toggle blurring.
    BlurEnabled(bool),
    /// Toggle per-frame recapture.
    AutoUpdate(bool),
    /// Toggle the noise overlay.
    Noise(bool),
    /// Swap the backend for a freshly created one of this kind.
    Algorithm(BackendKind),
    /// Change when the snapshot matrix is recomputed.
    TransformMode(TransformMode),
    /// Change how the blur view's offset is measured.
    PositionStrategy(PositionStrategy),
    /// The blur view was resized; reallocate the snapshot.
    ViewResized,
    /// Destroy the controller.
    Destroy,
}

/// Cloneable, `Send` handle for posting [`SettingChange`]s.
#[derive(Clone, Debug)]
pub struct SettingsSender {
    tx: Sender<SettingChange>,
}

impl SettingsSender {
    /// Queue `change` for the owning controller.
    ///
    /// Fails with [`BlurError::Destroyed`] once the controller is gone.
    pub fn post(&self, change: SettingChange) -> BlurResult<()> {
        self.tx.send(change).map_err(|_| BlurError::Destroyed)
    }
}

/// Receiving end, owned by the controller.
#[derive(Debug)]
pub struct SettingsQueue {
    tx: Sender<SettingChange>,
    rx: Receiver<SettingChange>,
}

impl SettingsQueue {
    /// Empty queue.
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    /// New sender for this queue.
    pub fn sender(&self) -> SettingsSender {
        SettingsSender { tx: self.tx.clone() }
    }

    /// Take the next pending change without blocking.
    pub fn next_pending(&self) -> Option<SettingChange> {
        match self.rx.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

impl Default for SettingsQueue {
    fn default() -> Self {
        Self::new()
    }
}

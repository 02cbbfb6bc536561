//! Live blur for windowed UIs.
//!
//! A blur surface continuously shows a blurred copy of whatever the host draws behind it. Each
//! frame the pipeline:
//!
//! - recaptures the content root into a downscaled, stride-aligned snapshot
//!   ([`SizeScaler`], [`transform`])
//! - blurs it with an interchangeable [`BlurAlgorithm`]
//! - composites the result, plus an optional overlay, when the host draws the surface
//!
//! Hosts plug in through the traits in [`host`]. [`BlurView`] is the entry point; it owns one
//! [`BlurController`] state machine at a time.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Blur backends and backend selection.
pub mod algorithm;
/// Owned pixel buffers.
pub mod bitmap;
/// Software drawing surfaces and the snapshot identity marker.
pub mod canvas;
/// Serializable configuration.
pub mod config;
/// Snapshot, blur and composite state machine.
pub mod controller;
/// Host collaborator contracts.
pub mod host;
/// Cross-thread settings marshalling.
pub mod marshal;
/// Shared grain texture.
pub mod noise;
/// Snapshot sizing.
pub mod scale;
/// Content-root to snapshot coordinate mapping.
pub mod transform;
/// User-facing facade.
pub mod view;

pub use crate::foundation::core::{Affine, Color, PixelFormat, Point, Rect, Size, Vec2};
pub use crate::foundation::error::{BlurError, BlurResult};

pub use crate::algorithm::{
    AlgorithmSettings, BackendKind, BlurAlgorithm, CapabilityTier, DEFAULT_BLUR_RADIUS,
    RenderEffectPrecision, create_algorithm, select_backend,
};
pub use crate::bitmap::{Bitmap, BitmapId};
pub use crate::canvas::{PixmapCanvas, SnapshotCanvas, SnapshotMarker};
pub use crate::config::BlurConfig;
pub use crate::controller::{
    BlurController, BlurParameters, ControllerOptions, ControllerState, RecaptureStats,
};
pub use crate::host::{
    DrawSurface, Drawable, HostSignal, SignalHub, SignalListener, View, ViewTransform,
    ViewTreeObserver,
};
pub use crate::marshal::{SettingChange, SettingsSender};
pub use crate::scale::{ScaleResult, SizeScaler};
pub use crate::transform::{PositionStrategy, TransformMode};
pub use crate::view::{BlurHandle, BlurView, SetupOptions};

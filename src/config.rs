//! Serializable blur settings.
//!
//! ```json
//! { "radius": 20, "overlay_color": "#66FFFFFF", "backend": "software", "noise": true }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::{
    AlgorithmSettings, BackendKind, DEFAULT_BLUR_RADIUS, RenderEffectPrecision, create_algorithm,
};
use crate::controller::{BlurController, ControllerOptions};
use crate::foundation::core::Color;
use crate::foundation::error::{BlurError, BlurResult};
use crate::transform::{PositionStrategy, TransformMode};
use crate::view::SetupOptions;

/// Everything a blur surface can be configured with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurConfig {
    /// Blur radius in snapshot pixels.
    pub radius: f32,
    /// Flat color over the blurred backdrop.
    pub overlay_color: Color,
    /// Master switch.
    pub blur_enabled: bool,
    /// Recapture every frame.
    pub auto_update: bool,
    /// Downscale factor; `None` uses the backend's preference.
    pub scale_factor: Option<f32>,
    /// Backend; `None` picks one from the host capability tier.
    pub backend: Option<BackendKind>,
    /// Snapshot sizing for the compositor backend.
    pub precision: RenderEffectPrecision,
    /// Blur into the snapshot buffer rather than a new one, where supported.
    pub in_place: bool,
    /// When the snapshot matrix is recomputed.
    pub transform_mode: TransformMode,
    /// How the blur view's offset is measured.
    pub position_strategy: PositionStrategy,
    /// Grain overlay.
    pub noise: bool,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_BLUR_RADIUS,
            overlay_color: Color::TRANSPARENT,
            blur_enabled: true,
            auto_update: true,
            scale_factor: None,
            backend: None,
            precision: RenderEffectPrecision::default(),
            in_place: true,
            transform_mode: TransformMode::default(),
            position_strategy: PositionStrategy::default(),
            noise: false,
        }
    }
}

impl BlurConfig {
    /// Parse and validate JSON.
    pub fn from_json_str(s: &str) -> BlurResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| BlurError::validation(format!("invalid blur config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: &Path) -> BlurResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BlurError::Other(anyhow::anyhow!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> BlurResult<()> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(BlurError::validation(format!(
                "radius must be finite and >= 0, got {}",
                self.radius
            )));
        }
        if let Some(f) = self.scale_factor
            && (!f.is_finite() || f <= 0.0)
        {
            return Err(BlurError::validation(format!(
                "scale_factor must be finite and > 0, got {f}"
            )));
        }
        Ok(())
    }

    /// Backend creation settings.
    pub fn algorithm_settings(&self) -> AlgorithmSettings {
        AlgorithmSettings {
            in_place: self.in_place,
            precision: self.precision,
        }
    }

    /// Controller construction options.
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            scale_factor: self.scale_factor,
            transform_mode: self.transform_mode,
            position_strategy: self.position_strategy,
        }
    }

    /// Options for [`crate::BlurView::setup_with`]. Creates the backend if one is named.
    pub fn setup_options(&self) -> BlurResult<SetupOptions> {
        self.validate()?;
        let settings = self.algorithm_settings();
        let algorithm = self
            .backend
            .map(|kind| create_algorithm(kind, &settings))
            .transpose()?;
        Ok(SetupOptions {
            algorithm,
            settings,
            controller: self.controller_options(),
        })
    }

    /// Push every runtime setting onto `controller`.
    ///
    /// Swaps the backend only when `backend` names a different kind than the active one.
    pub fn apply(&self, controller: &mut BlurController) -> BlurResult<()> {
        self.validate()?;
        controller
            .set_blur_radius(self.radius)?
            .set_overlay_color(self.overlay_color)?
            .set_blur_auto_update(self.auto_update)?
            .set_blur_enabled(self.blur_enabled)?
            .set_noise_enabled(self.noise)?
            .set_transform_mode(self.transform_mode)?
            .set_position_strategy(self.position_strategy)?;
        if let Some(kind) = self.backend
            && kind != controller.algorithm_kind()
        {
            controller.set_blur_algorithm(create_algorithm(kind, &self.algorithm_settings())?)?;
        }
        Ok(())
    }
}

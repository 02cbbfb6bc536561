//! Mapping from content-root coordinates into snapshot pixels.
//!
//! The snapshot matrix is `S(1/sx, 1/sy) * own^-1 * T(-offset)`, where `offset` is the blur
//! view's position relative to the content root and `own` is the blur view's render transform.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Affine, Vec2};
use crate::host::{View, same_view};
use crate::scale::ScaleResult;

const MIN_DETERMINANT: f64 = 1e-12;

/// When the snapshot matrix is recomputed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Recompute on every recapture. Correct while the blur view moves or animates.
    #[default]
    PerFrame,
    /// Compute once when the snapshot is allocated and reuse it until the next resize.
    ///
    /// Output is wrong if the blur view moves relative to the content root afterwards.
    Fixed,
}

/// How the blur view's offset from the content root is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStrategy {
    /// Difference of the two views' screen positions. Works for any pair of views.
    #[default]
    AbsoluteScreen,
    /// Sum of `left`/`top` along the parent chain up to the content root.
    ///
    /// Only valid when the blur view is a descendant of the root. Falls back to
    /// [`PositionStrategy::AbsoluteScreen`] once if it is not.
    DescendantOffset,
}

/// Offset of `view` within `root` by walking parents. `None` if `root` is not an ancestor.
pub fn descendant_offset(root: &Rc<dyn View>, view: &Rc<dyn View>) -> Option<Vec2> {
    let mut offset = Vec2::ZERO;
    let mut current = Rc::clone(view);
    loop {
        if same_view(&current, root) {
            return Some(offset);
        }
        offset += Vec2::new(current.left(), current.top());
        current = current.parent()?;
    }
}

/// Offset of `view` within `root` from their screen positions.
pub fn screen_offset(root: &dyn View, view: &dyn View) -> Vec2 {
    view.location_on_screen() - root.location_on_screen()
}

/// Build the snapshot matrix for a blur view at `offset`.
///
/// Returns `None` when the view's render transform is singular (e.g. scaled to zero), in which
/// case nothing of the backdrop is visible through the view.
pub fn snapshot_matrix(view: &dyn View, offset: Vec2, scale: &ScaleResult) -> Option<Affine> {
    let own = view.render_transform().to_affine(view.size());
    if own.determinant().abs() < MIN_DETERMINANT {
        return None;
    }
    let downscale =
        Affine::scale_non_uniform(1.0 / f64::from(scale.scale_x), 1.0 / f64::from(scale.scale_y));
    Some(downscale * own.inverse() * Affine::translate(-offset))
}

/// Per-controller transform state: strategy, fallback flag and the fixed-mode cache.
#[derive(Clone, Debug)]
pub struct SnapshotTransform {
    mode: TransformMode,
    strategy: PositionStrategy,
    fell_back: bool,
    fixed: Option<Affine>,
}

impl SnapshotTransform {
    /// New state with no cached matrix.
    pub fn new(mode: TransformMode, strategy: PositionStrategy) -> Self {
        Self {
            mode,
            strategy,
            fell_back: false,
            fixed: None,
        }
    }

    /// Current recompute mode.
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// Strategy in effect, after any fallback.
    pub fn strategy(&self) -> PositionStrategy {
        self.strategy
    }

    /// Whether the descendant strategy was abandoned for this controller.
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    /// Switch mode. Drops the cached matrix.
    pub fn set_mode(&mut self, mode: TransformMode) {
        self.mode = mode;
        self.fixed = None;
    }

    /// Switch strategy. Clears the fallback flag and the cached matrix.
    pub fn set_strategy(&mut self, strategy: PositionStrategy) {
        self.strategy = strategy;
        self.fell_back = false;
        self.fixed = None;
    }

    /// Forget the cached fixed matrix; the next [`SnapshotTransform::matrix`] recomputes it.
    pub fn invalidate(&mut self) {
        self.fixed = None;
    }

    /// Offset of `view` within `root` under the current strategy.
    pub fn offset(&mut self, root: &Rc<dyn View>, view: &Rc<dyn View>) -> Vec2 {
        if self.strategy == PositionStrategy::DescendantOffset {
            if let Some(offset) = descendant_offset(root, view) {
                return offset;
            }
            tracing::warn!(
                "blur view is not a descendant of its content root; using screen positions"
            );
            self.strategy = PositionStrategy::AbsoluteScreen;
            self.fell_back = true;
        }
        screen_offset(root.as_ref(), view.as_ref())
    }

    /// Snapshot matrix for this frame.
    pub fn matrix(
        &mut self,
        root: &Rc<dyn View>,
        view: &Rc<dyn View>,
        scale: &ScaleResult,
    ) -> Option<Affine> {
        if self.mode == TransformMode::Fixed
            && let Some(m) = self.fixed
        {
            return Some(m);
        }
        let offset = self.offset(root, view);
        let m = snapshot_matrix(view.as_ref(), offset, scale)?;
        if self.mode == TransformMode::Fixed {
            self.fixed = Some(m);
        }
        Some(m)
    }
}

impl Default for SnapshotTransform {
    fn default() -> Self {
        Self::new(TransformMode::default(), PositionStrategy::default())
    }
}

#[cfg(test)]
#[path = "../tests/unit/transform/snapshot_matrix.rs"]
mod tests;

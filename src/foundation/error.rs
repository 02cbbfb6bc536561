/// Convenience result type used across blurview.
pub type BlurResult<T> = Result<T, BlurError>;

/// Top-level error taxonomy used by the blur pipeline.
///
/// Only caller misuse and backend failures are represented here. Transient "not ready yet"
/// conditions (zero-sized views, no buffer allocated) are not errors; the pipeline defers.
#[derive(thiserror::Error, Debug)]
pub enum BlurError {
    /// Invalid caller-provided values (scale factors, radii, sizes, config).
    #[error("validation error: {0}")]
    Validation(String),

    /// A blur backend failed while processing a buffer.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend kind was requested that is not compiled into this build.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A configuration call arrived after the controller was destroyed.
    #[error("controller destroyed")]
    Destroyed,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BlurError {
    /// Build a [`BlurError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`BlurError::Backend`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Build a [`BlurError::Unavailable`] value.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;

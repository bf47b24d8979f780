/// Convenience result type used across Livery.
pub type LiveryResult<T> = Result<T, LiveryError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Errors are local: a failure while loading or processing one layer never poisons the slot,
/// and a failure in one slot never touches another slot's committed texture.
#[derive(thiserror::Error, Debug)]
pub enum LiveryError {
    /// Invalid caller-provided data (unknown slot or layer, non-positive scale, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Source bytes could not be decoded as an image.
    #[error("decode error: {0}")]
    Decode(String),

    /// Source could not be fetched (missing file, released blob, unsupported scheme).
    #[error("load error: {0}")]
    Load(String),

    /// Rasterization backend failure while compositing a slot.
    #[error("composite failure: {0}")]
    Composite(String),

    /// Malformed saved configuration.
    #[error("configuration parse error: {0}")]
    ConfigurationParse(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LiveryError {
    /// Build a [`LiveryError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LiveryError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`LiveryError::Load`] value.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Build a [`LiveryError::Composite`] value.
    pub fn composite(msg: impl Into<String>) -> Self {
        Self::Composite(msg.into())
    }

    /// Build a [`LiveryError::ConfigurationParse`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationParse(msg.into())
    }

    /// Return `true` for errors that only mean "this layer has no image".
    pub fn is_missing_image(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Load(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;

pub type WallpaperResult<T> = Result<T, WallpaperError>;

#[derive(thiserror::Error, Debug)]
pub enum WallpaperError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(
        "dimension mismatch: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WallpaperError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
    }

    /// Whether the error only aborts the change on one output.
    ///
    /// Decode and resource failures leave the other outputs to be attempted;
    /// everything else aborts the whole operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Resource(_) | Self::Decode(_) | Self::DimensionMismatch { .. } | Self::Io(_)
        )
    }
}

//! Error types shared across the bridge

use std::path::PathBuf;

/// Errors from the document engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors from a display bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("display host I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid buffer size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("display host closed the connection")]
    Closed,
}

/// Failures of the page bridge itself.
///
/// Fatal only as `OpenFailed`, or as `Bridge` when the event stream
/// breaks; the rest are logged and recovered where they happen.
#[derive(Debug, thiserror::Error)]
pub enum PagerError {
    #[error("couldn't open {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("couldn't load page {index}: {source}")]
    PageLoadFailed {
        index: i64,
        #[source]
        source: EngineError,
    },

    #[error("render target build failed: {0}")]
    TargetBuildFailed(#[source] EngineError),

    #[error("couldn't run page: {0}")]
    RenderFailed(#[source] EngineError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

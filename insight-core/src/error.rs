use thiserror::Error;

use crate::navigation::NavigationRejected;

/// Failure of the remote outline extraction call. The controller only ever
/// displays these, so every variant carries a readable cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("failed to reach the extraction service: {0}")]
    Transport(String),

    #[error("failed to extract outline (HTTP status {status})")]
    Status { status: u16 },

    #[error("extraction service returned a malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewerLoadError {
    #[error("failed to load PDF preview: viewer engine unavailable")]
    EngineUnavailable,

    #[error("failed to load PDF preview: {0}")]
    Rejected(String),

    #[error("preview superseded by a newer document")]
    Superseded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewerApiError {
    #[error("failed to navigate to page {page}: {reason}")]
    Navigation { page: u32, reason: String },

    #[error("viewer handle no longer refers to the mounted document")]
    Detached,
}

/// The single error a session surfaces to the presentation layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    ViewerLoad(#[from] ViewerLoadError),

    #[error(transparent)]
    ViewerApi(#[from] ViewerApiError),

    #[error(transparent)]
    Validation(#[from] NavigationRejected),

    #[error("a document is already loaded or uploading; remove it first")]
    SessionBusy,
}

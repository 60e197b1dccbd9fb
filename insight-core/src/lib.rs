use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;

pub mod config;
pub mod error;
pub mod navigation;
pub mod outline;
pub mod runtime;
pub mod session;

pub use config::{PreviewConfig, ViewerConfig};
pub use error::{ExtractionError, PreviewError, ViewerApiError, ViewerLoadError};
pub use navigation::{is_navigable, validate, NavigationRejected};
pub use outline::{HeadingLevel, OutlineEntry, PageRef};
pub use runtime::{SessionHandle, SessionRuntime};
pub use session::{Action, Effect, Epoch, MountToken, OutlineRow, Session, SessionController};

/// A file the user picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    name: String,
    bytes: Bytes,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What the extraction service hands back for a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub outline: Vec<OutlineEntry>,
    pub document_url: String,
}

/// Opaque reference to one mounted viewer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerHandle(u64);

impl ViewerHandle {
    pub fn new(mount_id: u64) -> Self {
        Self(mount_id)
    }

    pub fn mount_id(&self) -> u64 {
        self.0
    }
}

#[async_trait::async_trait]
pub trait OutlineExtractor: Send + Sync {
    async fn submit(&self, document: &SourceDocument) -> Result<Extraction, ExtractionError>;
}

/// Capability interface over the embedded PDF viewer.
#[async_trait::async_trait]
pub trait DocumentViewer: Send + Sync {
    /// Loads the viewer engine at most once per process.
    async fn ensure_engine_loaded(&self);

    /// Reserves the next mount and tears down whatever is mounted. It never
    /// awaits, so an `unmount` issued afterwards cancels the reservation.
    fn begin_mount(&self) -> ViewerHandle;

    /// Mounts `document_url` under a reservation from [`begin_mount`]. Fails
    /// with [`ViewerLoadError::Superseded`] once the reservation was replaced
    /// or unmounted.
    ///
    /// [`begin_mount`]: DocumentViewer::begin_mount
    async fn mount(
        &self,
        reservation: ViewerHandle,
        document_url: &str,
        display_name: &str,
    ) -> Result<ViewerHandle, ViewerLoadError>;

    /// Best-effort page count; `None` when the viewer cannot tell.
    async fn page_count(&self, handle: &ViewerHandle) -> Option<u32>;

    /// Returns the page the viewer now shows.
    async fn go_to_page(&self, handle: &ViewerHandle, page: u32) -> Result<u32, ViewerApiError>;

    fn unmount(&self);
}

mod adapter;
mod engine;
#[cfg(feature = "pdfium")]
mod pdfium;

pub use adapter::{MountPhase, ViewerAdapter};
pub use engine::{EngineLoader, EngineSlot, PdfProperties, PreviewApis, PreviewRequest, ViewerEngine};
#[cfg(feature = "pdfium")]
pub use pdfium::{shared_slot, PdfiumEngine, PdfiumLoader, LIBRARY_PATH_ENV};

/// Builds a viewer backed by the process-wide pdfium engine.
#[cfg(feature = "pdfium")]
pub fn pdfium_viewer(config: &insight_core::ViewerConfig) -> ViewerAdapter {
    ViewerAdapter::new(shared_slot(config), config.clone())
}

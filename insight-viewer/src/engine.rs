use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// What the viewer is asked to preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub container_id: String,
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfProperties {
    pub page_count: Option<u32>,
}

/// A loaded rendering engine able to preview documents.
#[async_trait]
pub trait ViewerEngine: Send + Sync {
    async fn preview_file(&self, request: PreviewRequest) -> Result<Arc<dyn PreviewApis>>;
}

/// Per-document API surface handed out once a preview has rendered.
/// Dropping the last reference tears the preview down.
#[async_trait]
pub trait PreviewApis: Send + Sync {
    async fn pdf_properties(&self) -> Result<PdfProperties>;
    /// Moves to `page` and returns the page now shown.
    async fn goto_location(&self, page: u32) -> Result<u32>;
}

#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ViewerEngine>>;
}

/// Holds the engine once it has been loaded. The loader runs at most once;
/// a failed load is remembered and every later lookup reports no engine.
pub struct EngineSlot {
    loader: Box<dyn EngineLoader>,
    engine: OnceCell<Option<Arc<dyn ViewerEngine>>>,
}

impl EngineSlot {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            engine: OnceCell::new(),
        }
    }

    pub async fn ensure_loaded(&self) {
        self.engine
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(engine) => {
                        info!("viewer engine loaded");
                        Some(engine)
                    }
                    Err(err) => {
                        warn!(?err, "viewer engine failed to load");
                        None
                    }
                }
            })
            .await;
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }

    pub fn engine(&self) -> Option<Arc<dyn ViewerEngine>> {
        self.engine.get().and_then(|engine| engine.clone())
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use insight_core::ViewerConfig;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::engine::{EngineLoader, EngineSlot, PdfProperties, PreviewApis, PreviewRequest, ViewerEngine};

pub const LIBRARY_PATH_ENV: &str = "INSIGHT_PDFIUM_LIBRARY_PATH";

static SHARED_SLOT: OnceCell<Arc<EngineSlot>> = OnceCell::new();

/// Returns the process-wide pdfium slot. The first caller's configuration
/// decides which library gets bound.
pub fn shared_slot(config: &ViewerConfig) -> Arc<EngineSlot> {
    SHARED_SLOT
        .get_or_init(|| {
            Arc::new(EngineSlot::new(PdfiumLoader::new(
                config.engine_library.clone(),
            )))
        })
        .clone()
}

pub struct PdfiumLoader {
    library_path: Option<PathBuf>,
}

impl PdfiumLoader {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }
}

#[async_trait]
impl EngineLoader for PdfiumLoader {
    async fn load(&self) -> Result<Arc<dyn ViewerEngine>> {
        let library_path = self.library_path.clone();
        let pdfium = tokio::task::spawn_blocking(move || bind_pdfium(library_path.as_deref()))
            .await
            .context("pdfium binding task panicked")??;
        Ok(Arc::new(PdfiumEngine::new(pdfium)?))
    }
}

fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium> {
    if let Some(path) = explicit {
        return Pdfium::bind_to_library(path)
            .map(Pdfium::new)
            .map_err(|err| anyhow!("failed to load pdfium from {}: {err}", path.display()));
    }

    let mut errors = Vec::new();

    if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV).filter(|path| !path.is_empty()) {
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load pdfium from {LIBRARY_PATH_ENV}: {err}");
                errors.push(format!("{}: {err}", Path::new(&path).display()));
            }
        }
    }

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {err}", cwd_path.display())),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DocumentLocation {
    Remote(Url),
    Local(PathBuf),
}

impl DocumentLocation {
    fn parse(raw: &str) -> Result<Self> {
        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|_| anyhow!("{raw:?} is not a local file path")),
                other => bail!("unsupported document scheme {other:?}"),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self::Local(PathBuf::from(raw))),
            Err(err) => Err(err).with_context(|| format!("invalid document location {raw:?}")),
        }
    }
}

pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
    http: Client,
}

impl PdfiumEngine {
    pub fn new(pdfium: Pdfium) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            pdfium: Arc::new(pdfium),
            http,
        })
    }

    async fn fetch(&self, location: &DocumentLocation) -> Result<Vec<u8>> {
        match location {
            DocumentLocation::Remote(url) => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("failed to fetch {url}"))?
                    .error_for_status()
                    .with_context(|| format!("failed to fetch {url}"))?;
                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("failed to read {url}"))?;
                Ok(body.to_vec())
            }
            DocumentLocation::Local(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {:?}", path)),
        }
    }
}

#[async_trait]
impl ViewerEngine for PdfiumEngine {
    #[instrument(skip(self), fields(container = %request.container_id, url = %request.url))]
    async fn preview_file(&self, request: PreviewRequest) -> Result<Arc<dyn PreviewApis>> {
        let location = DocumentLocation::parse(&request.url)?;
        let bytes = self.fetch(&location).await?;

        let pdfium = Arc::clone(&self.pdfium);
        let properties = tokio::task::spawn_blocking(move || read_properties(&pdfium, bytes))
            .await
            .context("pdfium load task panicked")??;
        debug!(pages = ?properties.page_count, "preview ready");

        Ok(Arc::new(PdfiumPreview {
            file_name: request.file_name,
            properties,
        }))
    }
}

fn read_properties(pdfium: &Pdfium, bytes: Vec<u8>) -> Result<PdfProperties> {
    let document = pdfium
        .load_pdf_from_byte_vec(bytes, None)
        .map_err(|err| anyhow!("failed to open document: {err}"))?;
    let page_count = u32::try_from(document.pages().len()).unwrap_or_default();
    Ok(PdfProperties {
        page_count: Some(page_count).filter(|count| *count > 0),
    })
}

/// The document stays with pdfium only while its properties are read; a
/// preview confirms page moves against that page count.
struct PdfiumPreview {
    file_name: String,
    properties: PdfProperties,
}

#[async_trait]
impl PreviewApis for PdfiumPreview {
    async fn pdf_properties(&self) -> Result<PdfProperties> {
        Ok(self.properties.clone())
    }

    async fn goto_location(&self, page: u32) -> Result<u32> {
        let count = self.properties.page_count.unwrap_or(0);
        if page == 0 || page > count {
            bail!("{} has no page {page}", self.file_name);
        }
        debug!(page, file = %self.file_name, "moved to page");
        Ok(page)
    }
}

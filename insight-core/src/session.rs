use tracing::{debug, info, warn};

use crate::config::{ViewerConfig, DEFAULT_FILE_NAME};
use crate::error::{ExtractionError, PreviewError, ViewerApiError, ViewerLoadError};
use crate::navigation::{is_navigable, validate, NavigationRejected};
use crate::outline::{sort_by_page, HeadingLevel, OutlineEntry, PageRef};
use crate::{Extraction, SourceDocument, ViewerHandle};

/// Generation counter; bumped whenever the session is reset so that results
/// of work started for an older session can be recognised and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Identifies one mount request: the session generation plus the URL the
/// viewer was asked to show.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountToken {
    epoch: Epoch,
    url: String,
}

impl MountToken {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// The active document-viewing session, also published as the read-only
/// snapshot the presentation layer renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub document: Option<SourceDocument>,
    pub document_url: Option<String>,
    pub outline: Option<Vec<OutlineEntry>>,
    pub total_pages: Option<u32>,
    pub viewer_ready: bool,
    pub uploading: bool,
    pub last_error: Option<PreviewError>,
    pub hover_index: Option<usize>,
    /// Page the viewer last confirmed after a navigation.
    pub current_page: Option<u32>,
}

impl Session {
    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().map(SourceDocument::name)
    }

    /// An upload is running or a document is loaded.
    pub fn is_active(&self) -> bool {
        self.uploading || self.document.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }

    pub fn outline_rows(&self) -> Vec<OutlineRow> {
        let Some(outline) = self.outline.as_ref() else {
            return Vec::new();
        };
        outline
            .iter()
            .enumerate()
            .map(|(index, entry)| OutlineRow {
                index,
                text: entry.text.clone(),
                level: entry.level.clone(),
                indent: entry.level.indent(),
                page: entry.page,
                clickable: is_navigable(entry.page, self.total_pages),
                hovered: self.hover_index == Some(index),
            })
            .collect()
    }

    fn entry_is_clickable(&self, index: usize) -> bool {
        self.outline
            .as_ref()
            .and_then(|outline| outline.get(index))
            .map(|entry| is_navigable(entry.page, self.total_pages))
            .unwrap_or(false)
    }

    /// Readiness and page count belong to the viewer, so they are dropped
    /// whenever the URL it shows changes.
    fn set_document_url(&mut self, url: Option<String>) {
        if self.document_url != url {
            self.viewer_ready = false;
            self.total_pages = None;
            self.current_page = None;
        }
        self.document_url = url;
    }
}

/// One displayed outline line.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRow {
    pub index: usize,
    pub text: String,
    pub level: HeadingLevel,
    pub indent: usize,
    pub page: PageRef,
    pub clickable: bool,
    pub hovered: bool,
}

impl OutlineRow {
    pub fn tooltip(&self) -> String {
        if self.clickable {
            format!("Jump to page {}", self.page)
        } else {
            "Invalid page number".to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    StartUpload(SourceDocument),
    ExtractionSettled {
        epoch: Epoch,
        result: Result<Extraction, ExtractionError>,
    },
    MountSettled {
        token: MountToken,
        result: Result<ViewerHandle, ViewerLoadError>,
    },
    PageCountSettled {
        token: MountToken,
        page_count: Option<u32>,
    },
    RequestNavigation(PageRef),
    NavigationSettled {
        token: MountToken,
        result: Result<u32, ViewerApiError>,
    },
    RemoveDocument,
    SetHover(Option<usize>),
}

/// Work the controller asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Extract {
        epoch: Epoch,
        document: SourceDocument,
    },
    Mount {
        token: MountToken,
        display_name: String,
    },
    QueryPageCount {
        token: MountToken,
        handle: ViewerHandle,
    },
    Navigate {
        token: MountToken,
        handle: ViewerHandle,
        page: u32,
    },
    Unmount,
}

#[derive(Debug, Clone)]
struct MountedViewer {
    token: MountToken,
    handle: Option<ViewerHandle>,
}

/// Pure state machine behind a preview session. Every operation and every
/// async completion goes through [`SessionController::apply`].
pub struct SessionController {
    session: Session,
    epoch: Epoch,
    mounted: Option<MountedViewer>,
    default_file_name: String,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self::with_default_file_name(DEFAULT_FILE_NAME)
    }

    pub fn with_default_file_name(name: impl Into<String>) -> Self {
        Self {
            session: Session::default(),
            epoch: Epoch::default(),
            mounted: None,
            default_file_name: name.into(),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::with_default_file_name(config.default_file_name.clone())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::StartUpload(document) => self.start_upload(document),
            Action::ExtractionSettled { epoch, result } => self.on_extraction_settled(epoch, result),
            Action::MountSettled { token, result } => self.on_viewer_mount_settled(token, result),
            Action::PageCountSettled { token, page_count } => {
                self.on_page_count_settled(token, page_count);
                Vec::new()
            }
            Action::RequestNavigation(page) => self.request_navigation(page),
            Action::NavigationSettled { token, result } => {
                self.on_navigation_settled(token, result);
                Vec::new()
            }
            Action::RemoveDocument => self.remove_document(),
            Action::SetHover(index) => {
                self.set_hover(index);
                Vec::new()
            }
        }
    }

    fn start_upload(&mut self, document: SourceDocument) -> Vec<Effect> {
        if self.session.is_active() {
            warn!(
                file = document.name(),
                "upload rejected while another document is active"
            );
            self.session.last_error = Some(PreviewError::SessionBusy);
            return Vec::new();
        }

        self.reset();
        self.session.last_error = None;
        info!(file = document.name(), bytes = document.len(), "starting upload");
        self.session.document = Some(document.clone());
        self.session.uploading = true;

        vec![
            Effect::Unmount,
            Effect::Extract {
                epoch: self.epoch,
                document,
            },
        ]
    }

    fn on_extraction_settled(
        &mut self,
        epoch: Epoch,
        result: Result<Extraction, ExtractionError>,
    ) -> Vec<Effect> {
        if epoch != self.epoch || !self.session.uploading {
            debug!(?epoch, current = ?self.epoch, "dropping stale extraction result");
            return Vec::new();
        }

        match result {
            Ok(extraction) => {
                let mut outline = extraction.outline;
                sort_by_page(&mut outline);
                info!(
                    entries = outline.len(),
                    url = %extraction.document_url,
                    "outline received"
                );
                self.session.uploading = false;
                if self.session.last_error == Some(PreviewError::SessionBusy) {
                    self.session.last_error = None;
                }
                self.session.outline = Some(outline);
                self.session
                    .set_document_url(Some(extraction.document_url.clone()));

                let token = MountToken {
                    epoch: self.epoch,
                    url: extraction.document_url,
                };
                self.mounted = Some(MountedViewer {
                    token: token.clone(),
                    handle: None,
                });
                let display_name = self
                    .session
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(self.default_file_name.as_str())
                    .to_string();
                vec![Effect::Mount {
                    token,
                    display_name,
                }]
            }
            Err(err) => {
                warn!(%err, "outline extraction failed");
                self.reset();
                self.session.last_error = Some(err.into());
                Vec::new()
            }
        }
    }

    fn on_viewer_mount_settled(
        &mut self,
        token: MountToken,
        result: Result<ViewerHandle, ViewerLoadError>,
    ) -> Vec<Effect> {
        if !self.is_current(&token) {
            debug!(url = token.url(), "dropping stale mount result");
            return Vec::new();
        }

        match result {
            Ok(handle) => {
                info!(url = token.url(), "viewer ready");
                if let Some(mounted) = self.mounted.as_mut() {
                    mounted.handle = Some(handle);
                }
                self.session.viewer_ready = true;
                vec![Effect::QueryPageCount { token, handle }]
            }
            Err(err) => {
                warn!(%err, url = token.url(), "viewer failed to load document");
                self.session.viewer_ready = false;
                self.session.last_error = Some(err.into());
                Vec::new()
            }
        }
    }

    fn on_page_count_settled(&mut self, token: MountToken, page_count: Option<u32>) {
        if !self.is_current(&token) {
            debug!(url = token.url(), "dropping stale page count");
            return;
        }
        let page_count = page_count.filter(|count| *count > 0);
        if page_count.is_none() {
            debug!(url = token.url(), "page count unknown, bounds checks disabled");
        }
        self.session.total_pages = page_count;
        if let Some(index) = self.session.hover_index {
            if !self.session.entry_is_clickable(index) {
                self.session.hover_index = None;
            }
        }
    }

    fn request_navigation(&mut self, page: PageRef) -> Vec<Effect> {
        let target = validate(page, self.session.total_pages, self.session.viewer_ready);
        let page = match target {
            Ok(page) => page,
            Err(rejected) => {
                debug!(%rejected, ?page, "navigation rejected");
                self.session.last_error = Some(rejected.into());
                return Vec::new();
            }
        };

        let Some((token, handle)) = self.mounted.as_ref().and_then(|mounted| {
            mounted
                .handle
                .map(|handle| (mounted.token.clone(), handle))
        }) else {
            self.session.last_error = Some(NavigationRejected::ViewerNotReady.into());
            return Vec::new();
        };

        self.session.last_error = None;
        self.session.hover_index = None;
        debug!(page, "navigating");
        vec![Effect::Navigate {
            token,
            handle,
            page,
        }]
    }

    fn on_navigation_settled(&mut self, token: MountToken, result: Result<u32, ViewerApiError>) {
        if !self.is_current(&token) {
            return;
        }
        match result {
            Ok(page) => self.session.current_page = Some(page),
            Err(err) => {
                warn!(%err, "navigation failed");
                self.session.last_error = Some(err.into());
            }
        }
    }

    fn remove_document(&mut self) -> Vec<Effect> {
        if self.session.is_active() {
            info!(file = ?self.session.file_name(), "removing document");
        }
        self.reset();
        self.session.last_error = None;
        vec![Effect::Unmount]
    }

    fn set_hover(&mut self, index: Option<usize>) {
        match index {
            None => self.session.hover_index = None,
            Some(index) if self.session.entry_is_clickable(index) => {
                self.session.hover_index = Some(index)
            }
            Some(_) => {}
        }
    }

    /// Back to the empty session; the last error is kept so callers decide
    /// whether a reset should also clear it.
    fn reset(&mut self) {
        self.epoch = self.epoch.next();
        self.mounted = None;
        let last_error = self.session.last_error.take();
        self.session = Session {
            last_error,
            ..Session::default()
        };
    }

    fn is_current(&self, token: &MountToken) -> bool {
        token.epoch == self.epoch
            && self.session.document_url.as_deref() == Some(token.url.as_str())
            && self
                .mounted
                .as_ref()
                .map(|mounted| mounted.token == *token)
                .unwrap_or(false)
    }
}

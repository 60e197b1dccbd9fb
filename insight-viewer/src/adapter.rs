use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{DocumentViewer, ViewerApiError, ViewerConfig, ViewerHandle, ViewerLoadError};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::engine::{EngineSlot, PreviewApis, PreviewRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    Unmounted,
    Mounting,
    Ready,
    Failed,
}

enum MountState {
    Unmounted,
    Mounting {
        mount_id: u64,
    },
    Ready {
        mount_id: u64,
        apis: Arc<dyn PreviewApis>,
    },
    Failed {
        mount_id: u64,
    },
}

impl MountState {
    fn phase(&self) -> MountPhase {
        match self {
            MountState::Unmounted => MountPhase::Unmounted,
            MountState::Mounting { .. } => MountPhase::Mounting,
            MountState::Ready { .. } => MountPhase::Ready,
            MountState::Failed { .. } => MountPhase::Failed,
        }
    }
}

/// Wraps a [`crate::ViewerEngine`] behind the session's viewer capability.
///
/// Exactly one preview exists at a time: `begin_mount` replaces the previous
/// instance without awaiting, and a mount whose reservation was replaced or
/// unmounted is dropped, however late it settles.
pub struct ViewerAdapter {
    slot: Arc<EngineSlot>,
    config: ViewerConfig,
    state: Mutex<MountState>,
    next_mount_id: AtomicU64,
}

impl ViewerAdapter {
    pub fn new(slot: Arc<EngineSlot>, config: ViewerConfig) -> Self {
        Self {
            slot,
            config,
            state: Mutex::new(MountState::Unmounted),
            next_mount_id: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> MountPhase {
        self.state.lock().phase()
    }

    fn is_reserved(&self, mount_id: u64) -> bool {
        matches!(*self.state.lock(), MountState::Mounting { mount_id: current } if current == mount_id)
    }

    /// Records the outcome of `mount_id` if it is still the mount in progress.
    fn settle(&self, mount_id: u64, outcome: Option<Arc<dyn PreviewApis>>) -> bool {
        let mut state = self.state.lock();
        match *state {
            MountState::Mounting { mount_id: current } if current == mount_id => {
                *state = match outcome {
                    Some(apis) => MountState::Ready { mount_id, apis },
                    None => MountState::Failed { mount_id },
                };
                true
            }
            _ => false,
        }
    }

    fn apis_for(&self, handle: &ViewerHandle) -> Option<Arc<dyn PreviewApis>> {
        match &*self.state.lock() {
            MountState::Ready { mount_id, apis } if *mount_id == handle.mount_id() => {
                Some(Arc::clone(apis))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl DocumentViewer for ViewerAdapter {
    async fn ensure_engine_loaded(&self) {
        self.slot.ensure_loaded().await;
    }

    fn begin_mount(&self) -> ViewerHandle {
        let mount_id = self.next_mount_id.fetch_add(1, Ordering::SeqCst);
        let previous = mem::replace(&mut *self.state.lock(), MountState::Mounting { mount_id });
        if matches!(previous, MountState::Ready { .. }) {
            debug!("tearing down previous preview");
        }
        ViewerHandle::new(mount_id)
    }

    #[instrument(skip(self))]
    async fn mount(
        &self,
        reservation: ViewerHandle,
        document_url: &str,
        display_name: &str,
    ) -> Result<ViewerHandle, ViewerLoadError> {
        let mount_id = reservation.mount_id();
        if !self.is_reserved(mount_id) {
            debug!("reservation cancelled before the engine was ready");
            return Err(ViewerLoadError::Superseded);
        }

        let Some(engine) = self.slot.engine() else {
            return if self.settle(mount_id, None) {
                Err(ViewerLoadError::EngineUnavailable)
            } else {
                Err(ViewerLoadError::Superseded)
            };
        };

        let request = PreviewRequest {
            container_id: self.config.container_id.clone(),
            url: document_url.to_string(),
            file_name: display_name.to_string(),
        };

        match engine.preview_file(request).await {
            Ok(apis) => {
                if self.settle(mount_id, Some(apis)) {
                    Ok(reservation)
                } else {
                    debug!(mount_id, "dropping superseded preview");
                    Err(ViewerLoadError::Superseded)
                }
            }
            Err(err) => {
                if self.settle(mount_id, None) {
                    Err(ViewerLoadError::Rejected(format!("{err:#}")))
                } else {
                    Err(ViewerLoadError::Superseded)
                }
            }
        }
    }

    async fn page_count(&self, handle: &ViewerHandle) -> Option<u32> {
        let apis = self.apis_for(handle)?;
        match apis.pdf_properties().await {
            Ok(properties) => properties.page_count,
            Err(err) => {
                warn!(?err, "unable to read page count");
                None
            }
        }
    }

    async fn go_to_page(&self, handle: &ViewerHandle, page: u32) -> Result<u32, ViewerApiError> {
        let apis = self.apis_for(handle).ok_or(ViewerApiError::Detached)?;
        apis.goto_location(page)
            .await
            .map_err(|err| ViewerApiError::Navigation {
                page,
                reason: format!("{err:#}"),
            })
    }

    fn unmount(&self) {
        let previous = mem::replace(&mut *self.state.lock(), MountState::Unmounted);
        if !matches!(previous, MountState::Unmounted) {
            debug!("preview unmounted");
        }
    }
}

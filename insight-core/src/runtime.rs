use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::outline::PageRef;
use crate::session::{Action, Effect, Session, SessionController};
use crate::{DocumentViewer, OutlineExtractor, SourceDocument};

/// Drives a [`SessionController`]: applies user operations and async
/// completions one at a time and runs the effects they produce.
///
/// The runtime is the only writer of session state. Every suspension point
/// (extraction, engine load, mount, page count, navigation) runs in its own
/// task and reports back through the completion channel, tagged with the
/// generation it was started for.
pub struct SessionRuntime {
    controller: SessionController,
    extractor: Arc<dyn OutlineExtractor>,
    viewer: Arc<dyn DocumentViewer>,
    commands: mpsc::UnboundedReceiver<Action>,
    completions_tx: mpsc::UnboundedSender<Action>,
    completions: mpsc::UnboundedReceiver<Action>,
    state: watch::Sender<Session>,
}

impl SessionRuntime {
    pub fn new(
        extractor: Arc<dyn OutlineExtractor>,
        viewer: Arc<dyn DocumentViewer>,
    ) -> (Self, SessionHandle) {
        Self::with_controller(SessionController::new(), extractor, viewer)
    }

    pub fn with_controller(
        controller: SessionController,
        extractor: Arc<dyn OutlineExtractor>,
        viewer: Arc<dyn DocumentViewer>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(controller.session().clone());
        let runtime = Self {
            controller,
            extractor,
            viewer,
            commands,
            completions_tx,
            completions,
            state,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (runtime, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`SessionHandle`] has been dropped.
    #[instrument(name = "session_runtime", skip_all)]
    pub async fn run(mut self) {
        loop {
            let action = tokio::select! {
                biased;
                Some(action) = self.completions.recv() => action,
                command = self.commands.recv() => match command {
                    Some(action) => action,
                    None => break,
                },
            };
            self.dispatch(action);
        }
        debug!("all session handles dropped, shutting down");
        self.viewer.unmount();
    }

    fn dispatch(&mut self, action: Action) {
        let effects = self.controller.apply(action);
        let session = self.controller.session();
        self.state.send_if_modified(|published| {
            if published != session {
                *published = session.clone();
                true
            } else {
                false
            }
        });
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&self, effect: Effect) {
        match effect {
            Effect::Unmount => self.viewer.unmount(),
            Effect::Extract { epoch, document } => {
                let extractor = Arc::clone(&self.extractor);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = extractor.submit(&document).await;
                    let _ = completions.send(Action::ExtractionSettled { epoch, result });
                });
            }
            Effect::Mount {
                token,
                display_name,
            } => {
                // Reserved before spawning so a later Unmount cancels it.
                let reservation = self.viewer.begin_mount();
                let viewer = Arc::clone(&self.viewer);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    viewer.ensure_engine_loaded().await;
                    let result = viewer
                        .mount(reservation, token.url(), &display_name)
                        .await;
                    let _ = completions.send(Action::MountSettled { token, result });
                });
            }
            Effect::QueryPageCount { token, handle } => {
                let viewer = Arc::clone(&self.viewer);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let page_count = viewer.page_count(&handle).await;
                    let _ = completions.send(Action::PageCountSettled { token, page_count });
                });
            }
            Effect::Navigate {
                token,
                handle,
                page,
            } => {
                let viewer = Arc::clone(&self.viewer);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = viewer.go_to_page(&handle, page).await;
                    let _ = completions.send(Action::NavigationSettled { token, result });
                });
            }
        }
    }
}

/// Presentation-side view of a running session: read-only state plus the
/// operations that mutate it.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Action>,
    state: watch::Receiver<Session>,
}

impl SessionHandle {
    pub fn start_upload(&self, document: SourceDocument) {
        self.send(Action::StartUpload(document));
    }

    pub fn remove_document(&self) {
        self.send(Action::RemoveDocument);
    }

    pub fn request_navigation(&self, page: impl Into<PageRef>) {
        self.send(Action::RequestNavigation(page.into()));
    }

    pub fn set_hover(&self, index: Option<usize>) {
        self.send(Action::SetHover(index));
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Waits for a published state matching `predicate`; `None` once the
    /// runtime has stopped.
    pub async fn wait_until<F>(&self, predicate: F) -> Option<Session>
    where
        F: FnMut(&Session) -> bool,
    {
        let mut state = self.state.clone();
        let session = state.wait_for(predicate).await.ok()?;
        Some(session.clone())
    }

    fn send(&self, action: Action) {
        if self.commands.send(action).is_err() {
            debug!("session runtime stopped, dropping operation");
        }
    }
}

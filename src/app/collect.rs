// NetGather - app/collect.rs
//
// Collection lifecycle management. Runs the executor on a background
// thread and hands its events to the caller through an mpsc channel.
//
// Architecture:
//   - `CollectionManager` lives on the caller's thread; the executor runs
//     on a background thread and blocks there until every target is done.
//   - An `Arc<AtomicBool>` cancel flag stops new targets from starting.
//   - An `Arc<Progress>` exposes the completed/total counter without
//     draining the channel.

use crate::app::executor::{Executor, ExecutorConfig, Progress};
use crate::app::session::{Credentials, SessionProvider};
use crate::core::model::{CollectionEvent, Target};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Inputs for one collection run.
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub targets: Vec<Target>,
    pub command: String,
    pub credentials: Credentials,
    pub executor: ExecutorConfig,
}

/// Manages a collection run on a background thread.
pub struct CollectionManager {
    /// Channel receiver for the caller to drain events.
    pub events_rx: Option<mpsc::Receiver<CollectionEvent>>,

    /// Cancel flag shared with the background thread.
    cancel_flag: Option<Arc<AtomicBool>>,

    progress: Option<Arc<Progress>>,

    handle: Option<JoinHandle<()>>,
}

impl CollectionManager {
    pub fn new() -> Self {
        Self {
            events_rx: None,
            cancel_flag: None,
            progress: None,
            handle: None,
        }
    }

    /// Start a run. If one is already running it is cancelled first.
    pub fn start(&mut self, provider: Arc<dyn SessionProvider>, request: CollectionRequest) {
        self.cancel();

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(Progress::new());

        self.events_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));
        self.progress = Some(Arc::clone(&progress));

        let handle = std::thread::spawn(move || {
            let executor = Executor::new(provider, request.executor);
            let result = executor.run(
                request.targets,
                &request.command,
                &request.credentials,
                tx.clone(),
                cancel,
                progress,
            );
            if let Err(e) = result {
                let _ = tx.send(CollectionEvent::Failed {
                    error: e.to_string(),
                });
            }
        });
        self.handle = Some(handle);

        tracing::info!("Collection thread started");
    }

    /// Stop dispatching new targets. Targets already in flight finish (or
    /// time out) and every remaining target is reported as cancelled.
    pub fn cancel(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
        self.cancel_flag = None;
    }

    /// A flag that cancels this run when raised (e.g. from a signal handler).
    pub fn cancel_handle(&self) -> Option<Arc<AtomicBool>> {
        self.cancel_flag.clone()
    }

    /// `(completed, total)` for the current run.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.progress.as_ref().map(|p| (p.completed(), p.total()))
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&self) -> Vec<CollectionEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.events_rx {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    /// Wait up to `timeout` for the next event. `None` on timeout or once
    /// the run is over and every event has been delivered.
    pub fn next_event(&self, timeout: Duration) -> Option<CollectionEvent> {
        self.events_rx.as_ref()?.recv_timeout(timeout).ok()
    }

    /// Whether the background thread has exited.
    pub fn is_done(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Default for CollectionManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Deferred upload task
//!
//! The uploader never spawns threads on its own. [`UploaderTask`] is what the
//! caller schedules: running it blocks the current thread for the whole
//! transfer. [`UploaderTask::spawn`] and [`UploaderTask::run_blocking`] are
//! conveniences for putting it on a dedicated thread or on tokio's blocking
//! pool.

use super::listener::ListenerRelay;
use super::Shared;
use crate::error::ErrorCode;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Name given to threads started by [`UploaderTask::spawn`]
pub const THREAD_NAME: &str = "plf-uploader";

/// Reusable handle to an uploader's native run loop
///
/// Only one run per uploader may be in flight; extra concurrent runs are
/// rejected with [`ErrorCode::ThreadProcessing`] without entering the engine.
#[derive(Clone)]
pub struct UploaderTask {
    shared: Arc<Shared>,
}

/// Ends the run even if the engine unwinds
struct RunGuard<'a>(&'a ListenerRelay);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.end_run();
    }
}

impl UploaderTask {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Run the upload on the calling thread
    ///
    /// Returns once the engine's run loop returns, after the completion
    /// listener has been called.
    pub fn run(&self) -> Result<(), ErrorCode> {
        let relay = self.shared.begin_run().inspect_err(|code| {
            if *code == ErrorCode::ThreadProcessing {
                tracing::warn!(
                    manager = ?self.shared.manager(),
                    "Upload already running, refusing concurrent run"
                );
            }
        })?;
        let _guard = RunGuard(&relay);

        let span = tracing::info_span!("uploader.run", manager = ?self.shared.manager());
        let _entered = span.enter();

        tracing::debug!("Entering native upload loop");
        self.shared.engine().run_uploader(self.shared.manager());
        tracing::debug!("Native upload loop returned");

        Ok(())
    }

    /// Run on a new named thread
    pub fn spawn(&self) -> io::Result<JoinHandle<Result<(), ErrorCode>>> {
        let task = self.clone();
        thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || task.run())
    }

    /// Run on tokio's blocking thread pool
    pub async fn run_blocking(self) -> Result<(), ErrorCode> {
        match tokio::task::spawn_blocking(move || self.run()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Upload task did not complete");
                Err(ErrorCode::System)
            }
        }
    }
}

impl fmt::Debug for UploaderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderTask")
            .field("manager", self.shared.manager())
            .finish()
    }
}

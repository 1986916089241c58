//! PLF uploader handle
//!
//! [`Uploader`] owns one native updater manager and drives its uploader
//! through `Uninitialized → Initialized → Disposed`:
//!
//! - [`Uploader::create`] initializes the native uploader, all-or-nothing
//! - [`Uploader::runnable`] hands out the task that performs the upload
//! - [`Uploader::cancel`] asks an in-flight run to stop
//! - [`Uploader::dispose`] releases the native uploader
//!
//! Disposal is explicit. Dropping the last reference to a handle that is still
//! initialized disposes it as a last resort and logs the leak.
//!
//! # Example
//!
//! ```no_run
//! use plf_uploadr::engine::{Md5Context, Product, UploaderEngine, UtilsContext};
//! use plf_uploadr::uploader::{Uploader, UploaderListeners};
//! use std::sync::Arc;
//!
//! # fn example(engine: Arc<dyn UploaderEngine>, utils: UtilsContext, md5: Md5Context)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let uploader = Uploader::with_engine(engine)?;
//!
//! let listeners = UploaderListeners::new()
//!     .on_progress(None, |_, percent| println!("{percent}%"))
//!     .on_completion(None, |_, outcome| println!("{outcome}"));
//! uploader.create("/tmp/fw", utils, md5, Product::from_raw(2), listeners)?;
//!
//! if let Some(task) = uploader.runnable() {
//!     task.spawn()?.join().ok();
//! }
//! uploader.dispose().into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod listener;
pub mod task;

pub use listener::{
    ListenerArg, ListenerRelay, PlfUploadCompletionListener, PlfUploadProgressListener,
    UploadOutcome, UploaderListeners,
};
pub use task::UploaderTask;

use crate::engine::{
    Md5Context, NativeManager, Product, UploaderEngine, UploaderParams, UtilsContext,
};
use crate::error::{ErrorCode, UpdaterError};
use crate::metrics;
use parking_lot::Mutex;
use std::fmt;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

/// Lifecycle state of an [`Uploader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderState {
    Uninitialized,
    Initialized,
    Disposed,
}

enum HandleState {
    Uninitialized,
    Initialized(Arc<ListenerRelay>),
    Disposed,
}

impl HandleState {
    fn public(&self) -> UploaderState {
        match self {
            HandleState::Uninitialized => UploaderState::Uninitialized,
            HandleState::Initialized(_) => UploaderState::Initialized,
            HandleState::Disposed => UploaderState::Disposed,
        }
    }
}

/// State shared by a handle and the tasks it hands out
pub(crate) struct Shared {
    engine: Arc<dyn UploaderEngine>,
    manager: ManuallyDrop<NativeManager>,
    state: Mutex<HandleState>,
}

impl Shared {
    pub(crate) fn engine(&self) -> &dyn UploaderEngine {
        self.engine.as_ref()
    }

    pub(crate) fn manager(&self) -> &NativeManager {
        &self.manager
    }

    /// The relay of an initialized handle
    pub(crate) fn relay(&self) -> Option<Arc<ListenerRelay>> {
        match &*self.state.lock() {
            HandleState::Initialized(relay) => Some(relay.clone()),
            _ => None,
        }
    }

    /// Claim the run slot of an initialized handle
    ///
    /// Done under the state lock so that `dispose` either sees the run or
    /// finishes before it starts.
    pub(crate) fn begin_run(&self) -> Result<Arc<ListenerRelay>, ErrorCode> {
        let state = self.state.lock();
        let HandleState::Initialized(relay) = &*state else {
            return Err(ErrorCode::ManagerNotInitialized);
        };

        if !relay.begin_run() {
            return Err(ErrorCode::ThreadProcessing);
        }
        Ok(relay.clone())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), HandleState::Disposed);
        // SAFETY: `manager` is not touched again after this point.
        let manager = unsafe { ManuallyDrop::take(&mut self.manager) };

        if let HandleState::Initialized(relay) = state {
            tracing::error!(manager = ?manager, "Uploader was not disposed");

            let code = ErrorCode::from_native(self.engine.delete_uploader(&manager));
            if !code.is_ok() {
                tracing::error!(
                    manager = ?manager,
                    code = %code,
                    "Unable to dispose uploader, leaking native resources"
                );
                metrics::record_leaked_handle();
                // The engine may still call into the relay.
                std::mem::forget(relay);
                return;
            }
        }

        self.engine.delete_manager(manager);
    }
}

/// Handle over one native PLF uploader
///
/// Methods take `&self`; the handle can be shared across threads so that
/// [`cancel`](Self::cancel) may be called while a run is in flight.
pub struct Uploader {
    shared: Arc<Shared>,
}

impl Uploader {
    /// Wrap a manager allocated by `engine`
    pub fn new(engine: Arc<dyn UploaderEngine>, manager: NativeManager) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                manager: ManuallyDrop::new(manager),
                state: Mutex::new(HandleState::Uninitialized),
            }),
        }
    }

    /// Allocate a fresh manager from `engine` and wrap it
    pub fn with_engine(engine: Arc<dyn UploaderEngine>) -> Result<Self, ErrorCode> {
        let manager = engine.new_manager()?;
        Ok(Self::new(engine, manager))
    }

    /// Create the native uploader
    ///
    /// On any failure the handle is left `Uninitialized` and may be created
    /// again.
    #[tracing::instrument(
        name = "uploader.create",
        skip(self, root_folder, utils, md5, listeners),
        fields(
            manager = ?self.shared.manager(),
            root_folder = %root_folder.as_ref().display(),
            product = %product
        ),
        err
    )]
    pub fn create(
        &self,
        root_folder: impl AsRef<Path>,
        utils: UtilsContext,
        md5: Md5Context,
        product: Product,
        listeners: UploaderListeners,
    ) -> Result<(), UpdaterError> {
        let mut state = self.shared.state.lock();

        match *state {
            HandleState::Initialized(_) => return Err(UpdaterError::AlreadyInitialized),
            HandleState::Disposed => return Err(UpdaterError::Disposed),
            HandleState::Uninitialized => {}
        }

        let root_folder = root_folder.as_ref();
        if root_folder.as_os_str().is_empty() {
            return Err(UpdaterError::InvalidRootFolder(
                "root folder must not be empty".into(),
            ));
        }

        let params = UploaderParams {
            root_folder: root_folder.to_path_buf(),
            utils,
            md5,
            product,
        };
        let relay = Arc::new(ListenerRelay::new(listeners));

        let code = ErrorCode::from_native(self.shared.engine.new_uploader(
            self.shared.manager(),
            &params,
            relay.clone(),
        ));
        if !code.is_ok() {
            return Err(UpdaterError::Native(code));
        }

        *state = HandleState::Initialized(relay);
        tracing::info!("Uploader created");

        Ok(())
    }

    /// Release the native uploader
    ///
    /// A no-op returning [`ErrorCode::Ok`] unless the handle is initialized.
    /// The handle only becomes `Disposed` when the engine confirms the
    /// release; on failure it stays initialized and disposal can be retried.
    /// While a task is running, returns [`ErrorCode::ThreadProcessing`]
    /// without touching the engine.
    pub fn dispose(&self) -> ErrorCode {
        let mut state = self.shared.state.lock();

        let HandleState::Initialized(relay) = &*state else {
            return ErrorCode::Ok;
        };
        if relay.is_running() {
            tracing::warn!(
                manager = ?self.shared.manager(),
                "Upload running, refusing to dispose"
            );
            return ErrorCode::ThreadProcessing;
        }

        let code =
            ErrorCode::from_native(self.shared.engine.delete_uploader(self.shared.manager()));
        if code.is_ok() {
            *state = HandleState::Disposed;
            tracing::debug!(manager = ?self.shared.manager(), "Uploader disposed");
        } else {
            tracing::warn!(
                manager = ?self.shared.manager(),
                code = %code,
                "Uploader disposal failed"
            );
        }

        code
    }

    /// Ask an in-flight run to stop
    ///
    /// Returns the engine's answer whether or not a run is active. Stopping is
    /// not immediate: the run's completion listener reports when it is over.
    /// The request sticks: a run started afterwards is aborted and reported
    /// as canceled too.
    pub fn cancel(&self) -> ErrorCode {
        let Some(relay) = self.shared.relay() else {
            return ErrorCode::ManagerNotInitialized;
        };

        relay.request_cancel();
        metrics::record_cancel_request();

        let code =
            ErrorCode::from_native(self.shared.engine.cancel_uploader(self.shared.manager()));
        tracing::debug!(
            manager = ?self.shared.manager(),
            running = relay.is_running(),
            code = %code,
            "Upload cancel requested"
        );

        code
    }

    /// The task that performs the upload, while initialized
    pub fn runnable(&self) -> Option<UploaderTask> {
        self.shared
            .relay()
            .map(|_| UploaderTask::new(self.shared.clone()))
    }

    pub fn state(&self) -> UploaderState {
        self.shared.state.lock().public()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == UploaderState::Initialized
    }
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("manager", self.shared.manager())
            .field("state", &self.state())
            .finish()
    }
}

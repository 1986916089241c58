//! Progress and completion listeners
//!
//! Callers hand the uploader two listeners, each paired with an opaque
//! argument that is passed back verbatim on every invocation. The engine never
//! sees the listeners directly: it talks to a [`ListenerRelay`], which forwards
//! synchronously on the engine's thread and holds the per-run contract:
//!
//! - progress is clamped to `0..=100` and never goes backwards within a run
//! - completion fires at most once per run
//! - once a cancel has been requested, every later run ends `Canceled`

use crate::error::ErrorCode;
use crate::metrics;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI16, Ordering};
use std::sync::Arc;

/// Opaque caller-supplied value forwarded to a listener
pub type ListenerArg = Arc<dyn Any + Send + Sync>;

/// Receives upload progress, in percent
pub trait PlfUploadProgressListener: Send + Sync {
    fn on_plf_upload_progress(&self, arg: Option<&ListenerArg>, progress: u8);
}

/// Receives the end-of-run status, exactly once per run
pub trait PlfUploadCompletionListener: Send + Sync {
    fn on_plf_upload_complete(&self, arg: Option<&ListenerArg>, outcome: UploadOutcome);
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Succeeded,
    /// The engine reported an error
    Failed(ErrorCode),
    /// The run ended after a cancel was requested, carrying the engine's code
    ///
    /// The engine may stop cleanly on cancel, so the code can be `Ok`.
    Canceled(ErrorCode),
}

impl UploadOutcome {
    /// Classify the engine's final code
    pub fn classify(code: ErrorCode, cancel_requested: bool) -> Self {
        match code {
            code if cancel_requested => UploadOutcome::Canceled(code),
            ErrorCode::Ok => UploadOutcome::Succeeded,
            code => UploadOutcome::Failed(code),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            UploadOutcome::Succeeded => ErrorCode::Ok,
            UploadOutcome::Failed(code) | UploadOutcome::Canceled(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Succeeded)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            UploadOutcome::Succeeded => "success",
            UploadOutcome::Failed(_) => "failure",
            UploadOutcome::Canceled(_) => "canceled",
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Succeeded => write!(f, "upload succeeded"),
            UploadOutcome::Failed(code) => write!(f, "upload failed: {}", code),
            UploadOutcome::Canceled(code) => write!(f, "upload canceled: {}", code),
        }
    }
}

struct FnProgress<F>(F);

impl<F> PlfUploadProgressListener for FnProgress<F>
where
    F: Fn(Option<&ListenerArg>, u8) + Send + Sync,
{
    fn on_plf_upload_progress(&self, arg: Option<&ListenerArg>, progress: u8) {
        (self.0)(arg, progress)
    }
}

struct FnCompletion<F>(F);

impl<F> PlfUploadCompletionListener for FnCompletion<F>
where
    F: Fn(Option<&ListenerArg>, UploadOutcome) + Send + Sync,
{
    fn on_plf_upload_complete(&self, arg: Option<&ListenerArg>, outcome: UploadOutcome) {
        (self.0)(arg, outcome)
    }
}

/// Listener set given to [`crate::Uploader::create`]
///
/// Both listeners are optional; a missing listener simply drops its events.
#[derive(Default, Clone)]
pub struct UploaderListeners {
    progress: Option<Arc<dyn PlfUploadProgressListener>>,
    progress_arg: Option<ListenerArg>,
    completion: Option<Arc<dyn PlfUploadCompletionListener>>,
    completion_arg: Option<ListenerArg>,
}

impl UploaderListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress listener and its argument
    pub fn progress(
        mut self,
        listener: Arc<dyn PlfUploadProgressListener>,
        arg: Option<ListenerArg>,
    ) -> Self {
        self.progress = Some(listener);
        self.progress_arg = arg;
        self
    }

    /// Set the completion listener and its argument
    pub fn completion(
        mut self,
        listener: Arc<dyn PlfUploadCompletionListener>,
        arg: Option<ListenerArg>,
    ) -> Self {
        self.completion = Some(listener);
        self.completion_arg = arg;
        self
    }

    /// Use a closure as the progress listener
    pub fn on_progress<F>(self, arg: Option<ListenerArg>, f: F) -> Self
    where
        F: Fn(Option<&ListenerArg>, u8) + Send + Sync + 'static,
    {
        self.progress(Arc::new(FnProgress(f)), arg)
    }

    /// Use a closure as the completion listener
    pub fn on_completion<F>(self, arg: Option<ListenerArg>, f: F) -> Self
    where
        F: Fn(Option<&ListenerArg>, UploadOutcome) + Send + Sync + 'static,
    {
        self.completion(Arc::new(FnCompletion(f)), arg)
    }
}

impl fmt::Debug for UploaderListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderListeners")
            .field("progress", &self.progress.is_some())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/// Engine-facing side of the listeners
///
/// One relay lives for the whole initialized lifetime of an uploader. The
/// engine reports through [`notify_progress`](Self::notify_progress) and
/// [`notify_completion`](Self::notify_completion) from whatever thread runs the
/// upload.
///
/// A cancel request is sticky for the relay's lifetime. The native engine
/// keeps its own cancel flag until the uploader is deleted, so a cancelled
/// uploader aborts every later run as well.
pub struct ListenerRelay {
    listeners: UploaderListeners,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    completed: AtomicBool,
    /// Last forwarded percentage, -1 before the first one of a run
    last_progress: AtomicI16,
}

impl ListenerRelay {
    pub fn new(listeners: UploaderListeners) -> Self {
        Self {
            listeners,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            last_progress: AtomicI16::new(-1),
        }
    }

    /// Forward a progress report from the engine
    pub fn notify_progress(&self, percent: f32) {
        let clamped = if percent.is_nan() {
            0
        } else {
            percent.clamp(0.0, 100.0) as i16
        };

        let previous = self.last_progress.fetch_max(clamped, Ordering::AcqRel);
        if clamped < previous {
            tracing::debug!(
                progress = clamped,
                last = previous,
                "Dropping regressing progress report"
            );
            return;
        }

        if let Some(listener) = &self.listeners.progress {
            listener.on_plf_upload_progress(self.listeners.progress_arg.as_ref(), clamped as u8);
        }
    }

    /// Forward the engine's end-of-run code
    pub fn notify_completion(&self, raw: i32) {
        let code = ErrorCode::from_native(raw);

        if self.completed.swap(true, Ordering::AcqRel) {
            tracing::warn!(code = %code, "Dropping duplicate completion report");
            return;
        }

        let outcome =
            UploadOutcome::classify(code, self.cancel_requested.load(Ordering::Acquire));
        metrics::record_run_outcome(&outcome);

        match outcome {
            UploadOutcome::Succeeded => tracing::info!("PLF upload completed"),
            UploadOutcome::Canceled(code) => tracing::info!(code = %code, "PLF upload canceled"),
            UploadOutcome::Failed(code) => tracing::error!(code = %code, "PLF upload failed"),
        }

        if let Some(listener) = &self.listeners.completion {
            listener.on_plf_upload_complete(self.listeners.completion_arg.as_ref(), outcome);
        }
    }

    /// Mark the start of a run; `false` if one is already in flight
    pub(crate) fn begin_run(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.completed.store(false, Ordering::Release);
        self.last_progress.store(-1, Ordering::Release);
        true
    }

    pub(crate) fn end_run(&self) {
        if !self.completed.load(Ordering::Acquire) {
            tracing::warn!("PLF upload run returned without reporting completion");
        }
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ListenerRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRelay")
            .field("listeners", &self.listeners)
            .field("running", &self.is_running())
            .finish()
    }
}

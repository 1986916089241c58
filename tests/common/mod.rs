//! Common Test Infrastructure
//!
//! Provides shared utilities for uploader integration tests:
//! - A scripted engine that behaves like the native one (blocking run loop,
//!   a cancel flag that stays set until the uploader is deleted, refusing
//!   deletion while running)
//! - A listener recorder

#![allow(dead_code)]

use parking_lot::Mutex;
use plf_uploadr::engine::{
    Md5Context, NativeManager, Product, UploaderEngine, UploaderParams, UtilsContext,
};
use plf_uploadr::uploader::{ListenerArg, ListenerRelay, UploadOutcome, UploaderListeners};
use plf_uploadr::ErrorCode;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Code the scripted engine reports when a run is aborted
pub const ABORTED_CODE: ErrorCode = ErrorCode::UploaderArutils;

pub fn utils() -> UtilsContext {
    UtilsContext::from_raw(0xa000)
}

pub fn md5() -> Md5Context {
    Md5Context::from_raw(0xb000)
}

pub fn product() -> Product {
    Product::from_raw(2305)
}

/// In-process stand-in for the native updater
pub struct ScriptedEngine {
    create_code: i32,
    final_code: i32,
    steps: Vec<f32>,
    step_delay: Duration,
    clean_abort: bool,
    delete_failures: AtomicUsize,

    next_manager: AtomicU64,
    relay: Mutex<Option<Arc<ListenerRelay>>>,
    params: Mutex<Option<UploaderParams>>,
    canceled: AtomicBool,
    running: AtomicBool,

    pub runs: AtomicUsize,
    pub deleted_uploaders: AtomicUsize,
    pub released_managers: Mutex<Vec<u64>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            create_code: 0,
            final_code: 0,
            steps: vec![0.0, 25.0, 50.0, 75.0, 100.0],
            step_delay: Duration::ZERO,
            clean_abort: false,
            delete_failures: AtomicUsize::new(0),
            next_manager: AtomicU64::new(0x1000),
            relay: Mutex::new(None),
            params: Mutex::new(None),
            canceled: AtomicBool::new(false),
            running: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
            deleted_uploaders: AtomicUsize::new(0),
            released_managers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_create_code(mut self, code: i32) -> Self {
        self.create_code = code;
        self
    }

    pub fn with_final_code(mut self, code: ErrorCode) -> Self {
        self.final_code = code.to_native();
        self
    }

    pub fn with_steps(mut self, steps: Vec<f32>, step_delay: Duration) -> Self {
        self.steps = steps;
        self.step_delay = step_delay;
        self
    }

    /// A long run: 1% every 10ms
    pub fn slow() -> Self {
        Self::new().with_steps(
            (0..=100).map(|p| p as f32).collect(),
            Duration::from_millis(10),
        )
    }

    /// Stop on cancel without reporting an error, like the native engine
    pub fn with_clean_abort(mut self) -> Self {
        self.clean_abort = true;
        self
    }

    /// Make the next `n` uploader deletions fail
    pub fn with_delete_failures(self, n: usize) -> Self {
        self.delete_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn last_params(&self) -> Option<UploaderParams> {
        self.params.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl UploaderEngine for ScriptedEngine {
    fn new_manager(&self) -> Result<NativeManager, ErrorCode> {
        let raw = self.next_manager.fetch_add(1, Ordering::SeqCst);
        Ok(unsafe { NativeManager::from_raw(raw) })
    }

    fn delete_manager(&self, manager: NativeManager) {
        self.released_managers.lock().push(manager.as_raw());
    }

    fn new_uploader(
        &self,
        _manager: &NativeManager,
        params: &UploaderParams,
        relay: Arc<ListenerRelay>,
    ) -> i32 {
        *self.params.lock() = Some(params.clone());
        if self.create_code != 0 {
            return self.create_code;
        }
        *self.relay.lock() = Some(relay);
        self.canceled.store(false, Ordering::SeqCst);
        0
    }

    fn delete_uploader(&self, _manager: &NativeManager) -> i32 {
        if self.relay.lock().is_none() {
            return ErrorCode::ManagerNotInitialized.to_native();
        }
        if self.running.load(Ordering::SeqCst) {
            return ErrorCode::ThreadProcessing.to_native();
        }
        if self
            .delete_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return ErrorCode::System.to_native();
        }

        *self.relay.lock() = None;
        self.deleted_uploaders.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn run_uploader(&self, _manager: &NativeManager) {
        let Some(relay) = self.relay.lock().clone() else {
            return;
        };

        self.runs.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        for step in &self.steps {
            if self.canceled.load(Ordering::SeqCst) {
                break;
            }
            relay.notify_progress(*step);
            if !self.step_delay.is_zero() {
                std::thread::sleep(self.step_delay);
            }
        }
        let code = match self.canceled.load(Ordering::SeqCst) {
            true if self.clean_abort => 0,
            true => ABORTED_CODE.to_native(),
            false => self.final_code,
        };

        self.running.store(false, Ordering::SeqCst);
        relay.notify_completion(code);
    }

    fn cancel_uploader(&self, _manager: &NativeManager) -> i32 {
        if self.relay.lock().is_none() {
            return ErrorCode::ManagerNotInitialized.to_native();
        }
        self.canceled.store(true, Ordering::SeqCst);
        0
    }
}

/// Records every listener invocation
#[derive(Default)]
pub struct Recorder {
    progress: Mutex<Vec<u8>>,
    outcomes: Mutex<Vec<UploadOutcome>>,
    args: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Listeners feeding this recorder; `tag` is used as both listener args
    pub fn listeners(self: &Arc<Self>, tag: &str) -> UploaderListeners {
        let arg: ListenerArg = Arc::new(tag.to_string());
        let (p, c) = (self.clone(), self.clone());

        UploaderListeners::new()
            .on_progress(Some(arg.clone()), move |arg, percent| {
                p.record_arg(arg);
                p.progress.lock().push(percent);
            })
            .on_completion(Some(arg), move |arg, outcome| {
                c.record_arg(arg);
                c.outcomes.lock().push(outcome);
            })
    }

    fn record_arg(&self, arg: Option<&ListenerArg>) {
        if let Some(tag) = arg.and_then(|a| a.downcast_ref::<String>()) {
            self.args.lock().push(tag.clone());
        }
    }

    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<UploadOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn args(&self) -> Vec<String> {
        self.args.lock().clone()
    }

    /// Block until at least one progress report arrived
    pub fn wait_for_progress(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !self.progress.lock().is_empty() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

//! `libarupdater` engine
//!
//! Links against the ARUpdater, ARUtils and ARSal C libraries. The listener
//! relay crosses the boundary as the callbacks' `void *arg`: one strong
//! reference is handed to the library when an uploader is created and taken
//! back once the library confirms the uploader is deleted.

use super::{Md5Context, NativeManager, UploaderEngine, UploaderParams, UtilsContext};
use crate::error::ErrorCode;
use crate::uploader::listener::ListenerRelay;
use libc::{c_char, c_float, c_int, c_void};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{CString, NulError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use thiserror::Error;

#[repr(C)]
struct ArUpdaterManager {
    _private: [u8; 0],
}

#[repr(C)]
struct ArUtilsManager {
    _private: [u8; 0],
}

#[repr(C)]
struct ArSalMd5Manager {
    _private: [u8; 0],
}

type ProgressCallback = extern "C" fn(arg: *mut c_void, percent: c_float);
type CompletionCallback = extern "C" fn(arg: *mut c_void, error: c_int);

#[link(name = "arupdater")]
extern "C" {
    fn ARUPDATER_Manager_New(error: *mut c_int) -> *mut ArUpdaterManager;
    fn ARUPDATER_Manager_Delete(manager: *mut *mut ArUpdaterManager);

    fn ARUPDATER_Uploader_New(
        manager: *mut ArUpdaterManager,
        root_folder: *const c_char,
        ftp_manager: *mut ArUtilsManager,
        md5_manager: *mut ArSalMd5Manager,
        product: c_int,
        progress_callback: Option<ProgressCallback>,
        progress_arg: *mut c_void,
        completion_callback: Option<CompletionCallback>,
        completion_arg: *mut c_void,
    ) -> c_int;
    fn ARUPDATER_Uploader_Delete(manager: *mut ArUpdaterManager) -> c_int;
    fn ARUPDATER_Uploader_ThreadRun(manager: *mut c_void) -> *mut c_void;
    fn ARUPDATER_Uploader_CancelThread(manager: *mut ArUpdaterManager) -> c_int;
}

#[link(name = "arutils")]
extern "C" {
    fn ARUTILS_Manager_New(error: *mut c_int) -> *mut ArUtilsManager;
    fn ARUTILS_Manager_Delete(manager: *mut *mut ArUtilsManager);
    fn ARUTILS_Manager_InitWifiFtp(
        manager: *mut ArUtilsManager,
        server: *const c_char,
        port: c_int,
        username: *const c_char,
        password: *const c_char,
    ) -> c_int;
    fn ARUTILS_Manager_CloseWifiFtp(manager: *mut ArUtilsManager);
}

#[link(name = "arsal")]
extern "C" {
    fn ARSAL_MD5_Manager_New(error: *mut c_int) -> *mut ArSalMd5Manager;
    fn ARSAL_MD5_Manager_Delete(manager: *mut *mut ArSalMd5Manager);
    fn ARSAL_MD5_Manager_Init(manager: *mut ArSalMd5Manager) -> c_int;
    fn ARSAL_MD5_Manager_Close(manager: *mut ArSalMd5Manager);
}

/// Errors setting up the native contexts
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("ARUtils error {0}")]
    Utils(i32),

    #[error("ARSal error {0}")]
    Sal(i32),

    #[error("Invalid string argument: {0}")]
    InvalidString(#[from] NulError),
}

extern "C" fn progress_trampoline(arg: *mut c_void, percent: c_float) {
    if arg.is_null() {
        return;
    }
    // SAFETY: `arg` is the relay reference leaked in `new_uploader`, alive
    // until the uploader is deleted.
    let relay = unsafe { &*(arg as *const ListenerRelay) };
    if catch_unwind(AssertUnwindSafe(|| relay.notify_progress(percent))).is_err() {
        tracing::error!("Progress listener panicked");
    }
}

extern "C" fn completion_trampoline(arg: *mut c_void, error: c_int) {
    if arg.is_null() {
        return;
    }
    // SAFETY: see `progress_trampoline`.
    let relay = unsafe { &*(arg as *const ListenerRelay) };
    if catch_unwind(AssertUnwindSafe(|| relay.notify_completion(error))).is_err() {
        tracing::error!("Completion listener panicked");
    }
}

fn manager_ptr(manager: &NativeManager) -> *mut ArUpdaterManager {
    manager.as_raw() as usize as *mut ArUpdaterManager
}

/// Engine backed by `libarupdater`
#[derive(Default)]
pub struct NativeEngine {
    /// Relay handed to the library, per manager, as `Arc::into_raw` addresses
    relays: Mutex<HashMap<u64, usize>>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UploaderEngine for NativeEngine {
    fn new_manager(&self) -> Result<NativeManager, ErrorCode> {
        let mut error: c_int = 0;
        let manager = unsafe { ARUPDATER_Manager_New(&mut error) };

        let code = ErrorCode::from_native(error);
        if !code.is_ok() || manager.is_null() {
            return Err(if code.is_ok() { ErrorCode::Alloc } else { code });
        }

        // SAFETY: freshly allocated, owned by nobody else.
        Ok(unsafe { NativeManager::from_raw(manager as usize as u64) })
    }

    fn delete_manager(&self, manager: NativeManager) {
        let mut ptr = manager_ptr(&manager);
        unsafe { ARUPDATER_Manager_Delete(&mut ptr) };
    }

    fn new_uploader(
        &self,
        manager: &NativeManager,
        params: &UploaderParams,
        relay: Arc<ListenerRelay>,
    ) -> i32 {
        let Some(root_folder) = params
            .root_folder
            .to_str()
            .and_then(|s| CString::new(s).ok())
        else {
            return ErrorCode::BadParameter.to_native();
        };

        let arg = Arc::into_raw(relay) as *mut c_void;
        let result = unsafe {
            ARUPDATER_Uploader_New(
                manager_ptr(manager),
                root_folder.as_ptr(),
                params.utils.as_raw() as usize as *mut ArUtilsManager,
                params.md5.as_raw() as usize as *mut ArSalMd5Manager,
                params.product.as_raw(),
                Some(progress_trampoline),
                arg,
                Some(completion_trampoline),
                arg,
            )
        };

        if ErrorCode::from_native(result).is_ok() {
            self.relays.lock().insert(manager.as_raw(), arg as usize);
        } else {
            // SAFETY: the library rejected the uploader and kept no reference.
            drop(unsafe { Arc::from_raw(arg as *const ListenerRelay) });
        }

        result
    }

    fn delete_uploader(&self, manager: &NativeManager) -> i32 {
        let result = unsafe { ARUPDATER_Uploader_Delete(manager_ptr(manager)) };

        if ErrorCode::from_native(result).is_ok() {
            if let Some(arg) = self.relays.lock().remove(&manager.as_raw()) {
                // SAFETY: the uploader is gone, no callback can fire anymore.
                drop(unsafe { Arc::from_raw(arg as *const ListenerRelay) });
            }
        }

        result
    }

    fn run_uploader(&self, manager: &NativeManager) {
        unsafe { ARUPDATER_Uploader_ThreadRun(manager_ptr(manager) as *mut c_void) };
    }

    fn cancel_uploader(&self, manager: &NativeManager) -> i32 {
        unsafe { ARUPDATER_Uploader_CancelThread(manager_ptr(manager)) }
    }
}

/// Initialize a freshly allocated manager, deleting it if that fails
///
/// Only an initialized manager may be closed, so the owning wrapper is built
/// after this succeeds.
fn init_or_delete<M>(
    mut manager: *mut M,
    init: impl FnOnce(*mut M) -> c_int,
    delete: impl FnOnce(*mut *mut M),
) -> Result<*mut M, c_int> {
    let error = init(manager);
    if error != 0 {
        delete(&mut manager);
        return Err(error);
    }
    Ok(manager)
}

/// Wifi FTP transport to the device (ARUtils manager)
pub struct FtpTransport {
    manager: *mut ArUtilsManager,
}

// The ARUtils manager is internally synchronized.
unsafe impl Send for FtpTransport {}
unsafe impl Sync for FtpTransport {}

impl FtpTransport {
    /// Open an FTP connection to `address:port`
    pub fn connect(
        address: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<Self, NativeError> {
        let address = CString::new(address)?;
        let username = CString::new(username)?;
        let password = CString::new(password)?;

        let mut error: c_int = 0;
        let manager = unsafe { ARUTILS_Manager_New(&mut error) };
        if manager.is_null() || error != 0 {
            return Err(NativeError::Utils(error));
        }

        let manager = init_or_delete(
            manager,
            |m| unsafe {
                ARUTILS_Manager_InitWifiFtp(
                    m,
                    address.as_ptr(),
                    c_int::from(port),
                    username.as_ptr(),
                    password.as_ptr(),
                )
            },
            |m| unsafe { ARUTILS_Manager_Delete(m) },
        )
        .map_err(NativeError::Utils)?;

        tracing::debug!(port, "FTP transport initialized");
        Ok(Self { manager })
    }

    pub fn context(&self) -> UtilsContext {
        UtilsContext::from_raw(self.manager as usize as u64)
    }
}

impl Drop for FtpTransport {
    fn drop(&mut self) {
        unsafe {
            ARUTILS_Manager_CloseWifiFtp(self.manager);
            ARUTILS_Manager_Delete(&mut self.manager);
        }
        self.manager = ptr::null_mut();
    }
}

/// MD5 verifier (ARSal MD5 manager)
pub struct Md5Verifier {
    manager: *mut ArSalMd5Manager,
}

unsafe impl Send for Md5Verifier {}
unsafe impl Sync for Md5Verifier {}

impl Md5Verifier {
    pub fn new() -> Result<Self, NativeError> {
        let mut error: c_int = 0;
        let manager = unsafe { ARSAL_MD5_Manager_New(&mut error) };
        if manager.is_null() || error != 0 {
            return Err(NativeError::Sal(error));
        }

        let manager = init_or_delete(
            manager,
            |m| unsafe { ARSAL_MD5_Manager_Init(m) },
            |m| unsafe { ARSAL_MD5_Manager_Delete(m) },
        )
        .map_err(NativeError::Sal)?;

        Ok(Self { manager })
    }

    pub fn context(&self) -> Md5Context {
        Md5Context::from_raw(self.manager as usize as u64)
    }
}

impl Drop for Md5Verifier {
    fn drop(&mut self) {
        unsafe {
            ARSAL_MD5_Manager_Close(self.manager);
            ARSAL_MD5_Manager_Delete(&mut self.manager);
        }
        self.manager = ptr::null_mut();
    }
}

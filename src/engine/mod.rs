//! Engine seam
//!
//! Everything the uploader asks of the native updater goes through
//! [`UploaderEngine`]. Methods mirror the native entry points one-to-one and
//! return raw `eARUPDATER_ERROR` integers; mapping them to [`ErrorCode`] is the
//! handle's job.
//!
//! The `native` feature provides [`native::NativeEngine`], which links against
//! `libarupdater`.

use crate::error::ErrorCode;
use crate::uploader::listener::ListenerRelay;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "native")]
pub mod native;

/// Opaque native updater manager
///
/// Ownership token for the engine's manager resource. It cannot be cloned, so
/// exactly one handle owns a given manager.
#[derive(PartialEq, Eq)]
pub struct NativeManager {
    raw: u64,
}

impl NativeManager {
    /// Wrap a raw manager value handed out by an engine
    ///
    /// # Safety
    ///
    /// `raw` must identify a live manager of the engine it will be used with,
    /// and no other `NativeManager` may wrap the same value.
    pub unsafe fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    /// The raw value, for passing to the engine
    pub fn as_raw(&self) -> u64 {
        self.raw
    }
}

impl fmt::Debug for NativeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeManager({:#x})", self.raw)
    }
}

/// Opaque, already configured transport (ARUtils) context
///
/// Borrowed by the uploader for the lifetime of the native uploader; the caller
/// keeps ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilsContext(u64);

impl UtilsContext {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Opaque, already configured MD5 verifier context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Md5Context(u64);

impl Md5Context {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Product identifier (`eARDISCOVERY_PRODUCT`), forwarded verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Product(i32);

impl Product {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product#{}", self.0)
    }
}

/// Parameters of a native uploader creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderParams {
    pub root_folder: PathBuf,
    pub utils: UtilsContext,
    pub md5: Md5Context,
    pub product: Product,
}

/// Native updater entry points
///
/// Implementations must tolerate `cancel_uploader` and `delete_uploader` being
/// called from another thread while `run_uploader` is blocked: the handle adds
/// no locking around them.
#[cfg_attr(test, mockall::automock)]
pub trait UploaderEngine: Send + Sync {
    /// Allocate a manager
    fn new_manager(&self) -> Result<NativeManager, ErrorCode>;

    /// Release a manager whose uploader has been deleted
    fn delete_manager(&self, manager: NativeManager);

    /// Create the manager's uploader
    ///
    /// The engine reports progress and completion through `relay` until the
    /// uploader is deleted.
    fn new_uploader(
        &self,
        manager: &NativeManager,
        params: &UploaderParams,
        relay: Arc<ListenerRelay>,
    ) -> i32;

    /// Delete the manager's uploader
    fn delete_uploader(&self, manager: &NativeManager) -> i32;

    /// Run the upload; blocks until it finishes or is canceled
    fn run_uploader(&self, manager: &NativeManager);

    /// Ask a running upload to stop
    fn cancel_uploader(&self, manager: &NativeManager) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_is_transparent_in_yaml() {
        let product: Product = serde_yaml::from_str("2305").unwrap();
        assert_eq!(product.as_raw(), 2305);
        assert_eq!(product.to_string(), "product#2305");
    }

    #[test]
    fn test_native_manager_debug_is_hex() {
        let manager = unsafe { NativeManager::from_raw(0xbeef) };
        assert_eq!(format!("{:?}", manager), "NativeManager(0xbeef)");
        assert_eq!(manager.as_raw(), 0xbeef);
    }
}

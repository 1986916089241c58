//! PLF Uploadr Library
//!
//! Safe handle over the ARUpdater PLF firmware upload engine.
//!
//! # Features
//!
//! - **Owned lifecycle**: create, run, cancel and dispose an uploader with
//!   typed results; a handle dropped while still initialized is disposed and
//!   the leak is logged
//! - **Listener contract**: progress stays within 0..=100 and never goes
//!   backwards in a run, completion fires once per run
//! - **Pluggable engine**: the native library behind the `native` feature, or
//!   any [`engine::UploaderEngine`] implementation
//!
//! # Example
//!
//! ```no_run
//! use plf_uploadr::engine::{Md5Context, Product, UploaderEngine, UtilsContext};
//! use plf_uploadr::{Uploader, UploaderListeners};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn UploaderEngine>, utils: UtilsContext, md5: Md5Context)
//! #     -> anyhow::Result<()> {
//! let uploader = Uploader::with_engine(engine)?;
//! uploader.create(
//!     "/tmp/fw",
//!     utils,
//!     md5,
//!     Product::from_raw(2),
//!     UploaderListeners::new().on_completion(None, |_, outcome| println!("{outcome}")),
//! )?;
//!
//! if let Some(task) = uploader.runnable() {
//!     task.run_blocking().await?;
//! }
//! uploader.dispose().into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod uploader;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorCode, UpdaterError};
pub use uploader::{UploadOutcome, Uploader, UploaderListeners, UploaderState, UploaderTask};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the native engine was compiled in
#[inline]
pub fn native_engine_available() -> bool {
    cfg!(feature = "native")
}

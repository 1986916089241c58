//! Updater error codes
//!
//! Native entry points report `eARUPDATER_ERROR` integers. [`ErrorCode`] maps
//! them one-to-one so a code read from the engine can be written back without
//! loss, including values this crate does not know about.

use std::fmt;
use thiserror::Error;

/// Result code reported by the updater engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No error
    Ok,

    /// Unknown generic error
    Error,
    /// Memory allocation error
    Alloc,
    /// Bad parameters
    BadParameter,
    /// System error
    System,
    /// A thread is already processing
    ThreadProcessing,

    /// Generic manager error
    Manager,
    ManagerAlreadyInitialized,
    ManagerNotInitialized,
    ManagerBufferTooSmall,

    /// Generic PLF error
    Plf,
    PlfFileNotFound,

    /// Generic downloader error
    Downloader,
    DownloaderArutils,
    DownloaderDownload,
    DownloaderPlatform,
    DownloaderAppOutOfDate,
    DownloaderPhp,
    DownloaderRenameFile,
    DownloaderFileNotFound,
    DownloaderMd5Mismatch,

    /// Generic uploader error
    Uploader,
    /// Transport (ARUtils) failure during upload
    UploaderArutils,
    /// Data transfer failure during upload
    UploaderArdatatransfer,
    /// System abstraction (ARSal) failure during upload
    UploaderArsal,

    /// A code this crate has no name for
    Unknown(i32),
}

const GENERIC_BASE: i32 = -1000;
const MANAGER_BASE: i32 = -2000;
const PLF_BASE: i32 = -3000;
const DOWNLOADER_BASE: i32 = -4000;
const UPLOADER_BASE: i32 = -5000;

impl ErrorCode {
    /// Map a native return value
    pub fn from_native(raw: i32) -> Self {
        use ErrorCode::*;

        match raw {
            0 => Ok,

            r if r == GENERIC_BASE => Error,
            r if r == GENERIC_BASE + 1 => Alloc,
            r if r == GENERIC_BASE + 2 => BadParameter,
            r if r == GENERIC_BASE + 3 => System,
            r if r == GENERIC_BASE + 4 => ThreadProcessing,

            r if r == MANAGER_BASE => Manager,
            r if r == MANAGER_BASE + 1 => ManagerAlreadyInitialized,
            r if r == MANAGER_BASE + 2 => ManagerNotInitialized,
            r if r == MANAGER_BASE + 3 => ManagerBufferTooSmall,

            r if r == PLF_BASE => Plf,
            r if r == PLF_BASE + 1 => PlfFileNotFound,

            r if r == DOWNLOADER_BASE => Downloader,
            r if r == DOWNLOADER_BASE + 1 => DownloaderArutils,
            r if r == DOWNLOADER_BASE + 2 => DownloaderDownload,
            r if r == DOWNLOADER_BASE + 3 => DownloaderPlatform,
            r if r == DOWNLOADER_BASE + 4 => DownloaderAppOutOfDate,
            r if r == DOWNLOADER_BASE + 5 => DownloaderPhp,
            r if r == DOWNLOADER_BASE + 6 => DownloaderRenameFile,
            r if r == DOWNLOADER_BASE + 7 => DownloaderFileNotFound,
            r if r == DOWNLOADER_BASE + 8 => DownloaderMd5Mismatch,

            r if r == UPLOADER_BASE => Uploader,
            r if r == UPLOADER_BASE + 1 => UploaderArutils,
            r if r == UPLOADER_BASE + 2 => UploaderArdatatransfer,
            r if r == UPLOADER_BASE + 3 => UploaderArsal,

            other => Unknown(other),
        }
    }

    /// The native value of this code
    pub fn to_native(self) -> i32 {
        use ErrorCode::*;

        match self {
            Ok => 0,

            Error => GENERIC_BASE,
            Alloc => GENERIC_BASE + 1,
            BadParameter => GENERIC_BASE + 2,
            System => GENERIC_BASE + 3,
            ThreadProcessing => GENERIC_BASE + 4,

            Manager => MANAGER_BASE,
            ManagerAlreadyInitialized => MANAGER_BASE + 1,
            ManagerNotInitialized => MANAGER_BASE + 2,
            ManagerBufferTooSmall => MANAGER_BASE + 3,

            Plf => PLF_BASE,
            PlfFileNotFound => PLF_BASE + 1,

            Downloader => DOWNLOADER_BASE,
            DownloaderArutils => DOWNLOADER_BASE + 1,
            DownloaderDownload => DOWNLOADER_BASE + 2,
            DownloaderPlatform => DOWNLOADER_BASE + 3,
            DownloaderAppOutOfDate => DOWNLOADER_BASE + 4,
            DownloaderPhp => DOWNLOADER_BASE + 5,
            DownloaderRenameFile => DOWNLOADER_BASE + 6,
            DownloaderFileNotFound => DOWNLOADER_BASE + 7,
            DownloaderMd5Mismatch => DOWNLOADER_BASE + 8,

            Uploader => UPLOADER_BASE,
            UploaderArutils => UPLOADER_BASE + 1,
            UploaderArdatatransfer => UPLOADER_BASE + 2,
            UploaderArsal => UPLOADER_BASE + 3,

            Unknown(raw) => raw,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// `Ok(())` for [`ErrorCode::Ok`], the code itself otherwise
    pub fn into_result(self) -> Result<(), ErrorCode> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Human readable description, as the engine's `Error_ToString` reports it
    pub fn description(self) -> &'static str {
        use ErrorCode::*;

        match self {
            Ok => "No error",
            Error => "Unknown generic error",
            Alloc => "Memory allocation error",
            BadParameter => "Bad parameters error",
            System => "System error",
            ThreadProcessing => "Thread processing error",
            Manager => "Unknown ARUPDATER_Manager error",
            ManagerAlreadyInitialized => "Manager already initialized",
            ManagerNotInitialized => "Manager not initialized",
            ManagerBufferTooSmall => "Buffer too small",
            Plf => "Unknown ARUPDATER_Plf error",
            PlfFileNotFound => "Plf file not found",
            Downloader => "Unknown ARUPDATER_Downloader error",
            DownloaderArutils => "Error in ARUtils",
            DownloaderDownload => "Download error",
            DownloaderPlatform => "Platform is not supported",
            DownloaderAppOutOfDate => "Application is out of date",
            DownloaderPhp => "Error in update server response",
            DownloaderRenameFile => "Error while renaming file",
            DownloaderFileNotFound => "Plf file not found",
            DownloaderMd5Mismatch => "MD5 checksum does not match",
            Uploader => "Unknown ARUPDATER_Uploader error",
            UploaderArutils => "Error in ARUtils",
            UploaderArdatatransfer => "Error in ARDataTransfer",
            UploaderArsal => "Error in ARSal",
            Unknown(_) => "Unknown value",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.to_native())
    }
}

impl std::error::Error for ErrorCode {}

impl From<i32> for ErrorCode {
    fn from(raw: i32) -> Self {
        ErrorCode::from_native(raw)
    }
}

/// Errors returned by [`crate::Uploader::create`]
///
/// Creation is all-or-nothing: whenever this is returned the handle is left
/// exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdaterError {
    #[error("Uploader creation failed: {0}")]
    Native(ErrorCode),

    #[error("Uploader is already initialized")]
    AlreadyInitialized,

    #[error("Uploader has been disposed")]
    Disposed,

    #[error("Invalid root folder: {0}")]
    InvalidRootFolder(String),
}

impl UpdaterError {
    /// The engine code behind this error, if the engine produced it
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            UpdaterError::Native(code) => Some(*code),
            _ => None,
        }
    }
}

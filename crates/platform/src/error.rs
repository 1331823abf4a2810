//! Failure taxonomy for facade operations.

use thiserror::Error;

/// Errors reported by platform facade operations.
///
/// The binding layer forwards the display string of these to scripts as the
/// message of a rejected promise, so messages are written for script authors.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A caller-supplied option failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A caller-supplied checksum did not match the uploaded bytes.
    #[error("{algorithm} checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum algorithm name as supplied by the caller.
        algorithm: &'static str,
        /// The hex digest the caller claimed.
        expected: String,
        /// The hex digest of the bytes actually received.
        computed: String,
    },

    /// A multipart upload id does not refer to an open upload.
    #[error("no such multipart upload for key {key:?}: {upload_id}")]
    NoSuchUpload {
        /// Target object key.
        key: String,
        /// The unknown upload id.
        upload_id: String,
    },

    /// A multipart completion referenced a part that was never staged.
    #[error("part {part_number} was not uploaded under this upload")]
    UnknownPart {
        /// The missing part number.
        part_number: u16,
    },

    /// A payload exceeded the emulator's size guard.
    #[error("value of {size} bytes exceeds the {limit} byte limit")]
    ValueTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// The configured guard.
        limit: usize,
    },

    /// SQL compilation or execution failed.
    #[error("sql error: {0}")]
    Sql(String),

    /// The backing store reported an internal failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for PlatformError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Sql(error.to_string())
    }
}

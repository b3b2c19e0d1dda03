//! Errors of the action log store.

use std::io;

use thiserror::Error;

/// Failure of the store itself.
#[derive(Debug, Error)]
pub enum LogError {
    /// The file ends in the middle of a record.
    #[error("truncated record at byte offset {offset}")]
    Truncated { offset: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error returned by [`crate::store::ActionStore::open`].
///
/// `E` is the error type of the restore/reorg callbacks, so callers get their
/// own failures back without boxing.
#[derive(Debug, Error)]
pub enum OpenError<E> {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("restore callback rejected a record")]
    Restore(#[source] E),
}

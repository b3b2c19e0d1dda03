//! Errors surfaced by the metadata core.

use std::io;

use thiserror::Error;
use tsrepo_actionlog::buf::DecodeError;
use tsrepo_actionlog::{LogError, RecordError};

use crate::id::{TableTid, TableUid};

pub type Result<T> = std::result::Result<T, MetaError>;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("table with uid {0} already exists")]
    TableAlreadyExists(TableUid),
    #[error("no table with uid {uid} and tid {tid}")]
    InvalidTableId { uid: TableUid, tid: TableTid },
    #[error("table {uid} is a {actual} table, expected {expected}")]
    InvalidTableType {
        uid: TableUid,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("invalid action: {0}")]
    InvalidAction(&'static str),
    #[error("invalid create message: {0}")]
    InvalidCreateMessage(String),
    #[error("incoming tag schema version {incoming} is older than local version {local}")]
    TagVersionOutOfDate { local: i32, incoming: i32 },
    #[error("meta file corrupted")]
    FileCorrupted(#[source] RecordError),
    #[error("failed to decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("meta store is not open")]
    StoreClosed,
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl MetaError {
    /// Shorthand for the common uid-only lookup miss.
    pub(crate) fn no_table(uid: TableUid) -> Self {
        Self::InvalidTableId {
            uid,
            tid: TableTid::NONE,
        }
    }
}

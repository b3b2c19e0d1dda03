//! Append-only action-record log for the tsrepo metadata core.
//!
//! A metadata mutation is serialized as a checksummed [`record::ActionRecord`],
//! parked on the in-memory [`list::ActionList`] of the current mutable
//! segment, and eventually drained into the file-backed
//! [`store::ActionStore`], which replays all records through a restore
//! callback on the next open.

pub mod buf;
pub mod error;
pub mod list;
pub mod record;
pub mod store;

pub use crate::{
    error::{LogError, OpenError},
    list::ActionList,
    record::{ActionKind, ActionRecord, ChecksumMismatch, RecordError},
    store::ActionStore,
};

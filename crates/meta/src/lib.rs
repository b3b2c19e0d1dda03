//! Table metadata core of a tsrepo storage shard.
//!
//! One [`registry::Meta`] per shard is the authoritative in-memory registry
//! of every table the shard contains and of the schema history by which
//! their rows are decoded. Four coupled views of the same tables are kept
//! consistent under a single reader/writer lock: the dense slot array, the
//! uid map, the super-table list, and each super table's secondary index
//! over its designated tag column. Every mutation is serialized into the
//! action log (see `tsrepo-actionlog`), from which the registry rebuilds
//! itself on [`registry::Meta::open`].

pub mod cfg;
pub mod error;
pub mod id;
pub mod msg;
pub mod name;
pub mod persist;
pub mod registry;
pub mod schema;
pub mod table;
pub mod tag_index;
pub mod tagrow;

pub use crate::{
    cfg::{CfgKind, TableCfg, MAX_SQL_LEN},
    error::{MetaError, Result},
    id::{ColId, TableTid, TableUid},
    msg::{CreateTableMsg, UpdateTagValMsg},
    name::{TableName, MAX_NAME_LEN},
    persist::META_FILE,
    registry::{Meta, MetaHooks, NoHooks, Options},
    schema::{ColType, ColumnSchema, Schema, SchemaHistory, MAX_SCHEMAS_PER_TABLE},
    table::{Table, TableKind},
    tag_index::TagIndex,
    tagrow::{TagRow, TagVal},
};

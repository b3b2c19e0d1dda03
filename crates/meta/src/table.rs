//! The per-table metadata record.
//!
//! A [`Table`] is shared between the registry's containers and in-flight
//! holders as an `Arc`. The registry lock guards where a table is reachable
//! from; the contents that can change after registration (schema history,
//! tag schema, tag row, tag index) sit behind their own locks so that a
//! holder may read them without the registry lock.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use tsrepo_actionlog::buf::{BufReader, BufWriter, DecodeError};

use crate::cfg::{CfgKind, TableCfg};
use crate::error::MetaError;
use crate::id::{ColId, TableTid, TableUid};
use crate::name::TableName;
use crate::schema::{Schema, SchemaHistory};
use crate::tag_index::TagIndex;
use crate::tagrow::{TagRow, TagVal};

/// Kind-specific payload of a table.
pub enum TableKind {
    /// Standalone table owning its schema history.
    Normal { schemas: RwLock<SchemaHistory> },
    /// Template of a family: schema history, tag schema, and the secondary
    /// index over its children. Owns no rows and no tid slot.
    Super {
        schemas: RwLock<SchemaHistory>,
        tag_schema: RwLock<Schema>,
        index: RwLock<TagIndex>,
    },
    /// Instance of a super table: tag values, no schema of its own.
    Child {
        super_uid: TableUid,
        tags: RwLock<TagRow>,
    },
    /// Like `Normal`, but materialized by a continuous query.
    Stream {
        schemas: RwLock<SchemaHistory>,
        sql: Box<str>,
    },
}

const KIND_NORMAL: u8 = 0;
const KIND_SUPER: u8 = 1;
const KIND_CHILD: u8 = 2;
const KIND_STREAM: u8 = 3;

pub struct Table {
    uid: TableUid,
    tid: TableTid,
    name: TableName,
    kind: TableKind,
    /// Use-count of in-flight query/commit holders. Starts at 1 on creation.
    refs: AtomicU32,
}

impl Table {
    /// Constructs a table from `cfg`.
    ///
    /// With `as_super` the kind is forced to Super: the name is taken from
    /// the cfg's super name, the uid from the super uid, the tid is the
    /// sentinel, and a fresh tag index is keyed on the declared tag column's
    /// type. Otherwise the kind follows `cfg.kind`; children copy the
    /// tag-value row and receive no schema, streams copy the query text.
    pub fn new(cfg: &TableCfg, as_super: bool) -> Result<Self, MetaError> {
        let invalid = |reason: &str| MetaError::InvalidCreateMessage(reason.to_owned());

        let schemas = || -> Result<RwLock<SchemaHistory>, MetaError> {
            let schema = cfg
                .schema
                .clone()
                .ok_or_else(|| invalid("column schema is required"))?;
            Ok(RwLock::new(SchemaHistory::new(schema)))
        };

        if as_super {
            let tag_schema = cfg
                .tag_schema
                .clone()
                .ok_or_else(|| invalid("super tables require a tag schema"))?;
            let key_ty = tag_schema
                .cols()
                .first()
                .ok_or_else(|| invalid("tag schema must declare at least one column"))?
                .ty;
            return Ok(Self {
                uid: cfg
                    .super_uid
                    .filter(|uid| !uid.is_none())
                    .ok_or_else(|| invalid("super tables require a uid"))?,
                tid: TableTid::NONE,
                name: cfg
                    .super_name
                    .clone()
                    .ok_or_else(|| invalid("super tables require a name"))?,
                kind: TableKind::Super {
                    schemas: schemas()?,
                    index: RwLock::new(TagIndex::new(key_ty)),
                    tag_schema: RwLock::new(tag_schema),
                },
                refs: AtomicU32::new(1),
            });
        }

        let kind = match cfg.kind {
            CfgKind::Normal => TableKind::Normal { schemas: schemas()? },
            CfgKind::Child => TableKind::Child {
                super_uid: cfg
                    .super_uid
                    .filter(|uid| !uid.is_none())
                    .ok_or_else(|| invalid("child tables require a super table uid"))?,
                tags: RwLock::new(cfg.tag_values.clone().unwrap_or_default()),
            },
            CfgKind::Stream => TableKind::Stream {
                schemas: schemas()?,
                sql: cfg
                    .sql
                    .as_deref()
                    .ok_or_else(|| invalid("stream tables require their source query text"))?
                    .into(),
            },
        };

        Ok(Self {
            uid: cfg.uid,
            tid: cfg.tid,
            name: cfg
                .name
                .clone()
                .ok_or_else(|| invalid("table name is required"))?,
            kind,
            refs: AtomicU32::new(1),
        })
    }

    pub fn uid(&self) -> TableUid {
        self.uid
    }

    pub fn tid(&self) -> TableTid {
        self.tid
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn is_super(&self) -> bool {
        matches!(self.kind, TableKind::Super { .. })
    }

    pub fn is_child(&self) -> bool {
        matches!(self.kind, TableKind::Child { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TableKind::Normal { .. } => "normal",
            TableKind::Super { .. } => "super",
            TableKind::Child { .. } => "child",
            TableKind::Stream { .. } => "stream",
        }
    }

    fn kind_byte(&self) -> u8 {
        match self.kind {
            TableKind::Normal { .. } => KIND_NORMAL,
            TableKind::Super { .. } => KIND_SUPER,
            TableKind::Child { .. } => KIND_CHILD,
            TableKind::Stream { .. } => KIND_STREAM,
        }
    }

    /// Uid of the owning super table; `None` unless this is a child.
    pub fn super_uid(&self) -> Option<TableUid> {
        match &self.kind {
            TableKind::Child { super_uid, .. } => Some(*super_uid),
            _ => None,
        }
    }

    /// Source query text; `None` unless this is a stream table.
    pub fn sql(&self) -> Option<&str> {
        match &self.kind {
            TableKind::Stream { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Schema history of a non-child table.
    pub fn schemas(&self) -> Option<&RwLock<SchemaHistory>> {
        match &self.kind {
            TableKind::Normal { schemas }
            | TableKind::Super { schemas, .. }
            | TableKind::Stream { schemas, .. } => Some(schemas),
            TableKind::Child { .. } => None,
        }
    }

    /// Tag schema of a super table.
    pub fn tag_schema(&self) -> Option<&RwLock<Schema>> {
        match &self.kind {
            TableKind::Super { tag_schema, .. } => Some(tag_schema),
            _ => None,
        }
    }

    /// Tag index of a super table.
    pub fn index(&self) -> Option<&RwLock<TagIndex>> {
        match &self.kind {
            TableKind::Super { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Tag-value row of a child table.
    pub fn tags(&self) -> Option<&RwLock<TagRow>> {
        match &self.kind {
            TableKind::Child { tags, .. } => Some(tags),
            _ => None,
        }
    }

    /// The child's current key in its super's tag index: the value of the
    /// designated tag column, or [`TagVal::Null`] when the row has none.
    pub(crate) fn tag_key(&self, col_id: ColId) -> TagVal {
        self.tags()
            .and_then(|tags| tags.read().get(col_id).cloned())
            .unwrap_or(TagVal::Null)
    }

    /// `(num_cols, row_bytes)` of the newest schema; `None` for children.
    pub(crate) fn schema_dims(&self) -> Option<(u32, u32)> {
        self.schemas().map(|schemas| {
            let schemas = schemas.read();
            let latest = schemas.latest();
            (latest.num_cols(), latest.row_bytes())
        })
    }

    /// Registers an in-flight holder.
    pub fn acquire(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Releases an in-flight holder, returning the remaining count.
    pub fn release(&self) -> u32 {
        let prev = self.refs.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0);
        prev - 1
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Relaxed)
    }

    /// Serializes this table as an action-record payload.
    pub fn encode(&self, out: &mut impl BufWriter) -> Result<(), DecodeError> {
        out.put_u8(self.kind_byte());
        out.put_str(&self.name)?;
        out.put_u64(self.uid.0);
        out.put_i32(if self.tid.is_none() {
            -1
        } else {
            self.tid.0 as i32
        });

        match &self.kind {
            TableKind::Child { super_uid, tags } => {
                out.put_u64(super_uid.0);
                tags.read().encode(out)?;
            }
            TableKind::Normal { schemas } => {
                schemas.read().encode(out);
            }
            TableKind::Super {
                schemas,
                tag_schema,
                ..
            } => {
                schemas.read().encode(out);
                tag_schema.read().encode(out);
            }
            TableKind::Stream { schemas, sql } => {
                schemas.read().encode(out);
                out.put_str(sql)?;
            }
        }
        Ok(())
    }

    /// Mirrors [`Table::encode`]. For super tables an empty tag index is
    /// built eagerly; children join their super's index only in the reorg
    /// pass after all records have been replayed.
    pub fn decode<'a>(reader: &mut impl BufReader<'a>) -> Result<Self, DecodeError> {
        let kind_byte = reader.get_u8()?;
        let name_str = reader.get_str()?;
        let name = TableName::from_str(name_str).ok_or(DecodeError::TooLong {
            what: "table name",
            len: name_str.len(),
        })?;
        let uid = TableUid(reader.get_u64()?);
        let tid = match reader.get_i32()? {
            t if t < 0 => TableTid::NONE,
            t => TableTid(t as u32),
        };

        let kind = match kind_byte {
            KIND_CHILD => TableKind::Child {
                super_uid: TableUid(reader.get_u64()?),
                tags: RwLock::new(TagRow::decode(reader)?),
            },
            KIND_NORMAL => TableKind::Normal {
                schemas: RwLock::new(SchemaHistory::decode(reader)?),
            },
            KIND_SUPER => {
                let schemas = SchemaHistory::decode(reader)?;
                let tag_schema = Schema::decode(reader)?;
                let key_col = tag_schema.cols().first().ok_or(DecodeError::InvalidTag {
                    tag: 0,
                    ty: "empty tag schema",
                })?;
                TableKind::Super {
                    index: RwLock::new(TagIndex::new(key_col.ty)),
                    schemas: RwLock::new(schemas),
                    tag_schema: RwLock::new(tag_schema),
                }
            }
            KIND_STREAM => TableKind::Stream {
                schemas: RwLock::new(SchemaHistory::decode(reader)?),
                sql: reader.get_str()?.into(),
            },
            tag => {
                return Err(DecodeError::InvalidTag {
                    tag,
                    ty: "TableKind",
                })
            }
        };

        Ok(Self {
            uid,
            tid,
            name,
            kind,
            refs: AtomicU32::new(1),
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("uid", &self.uid)
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Field-wise equality over the durable state: everything that survives an
/// encode/decode round trip. The use-count and the derived index contents
/// (rebuilt at reorg) are excluded.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if (self.uid, self.tid, &self.name) != (other.uid, other.tid, &other.name) {
            return false;
        }
        match (&self.kind, &other.kind) {
            (TableKind::Normal { schemas: a }, TableKind::Normal { schemas: b }) => {
                *a.read() == *b.read()
            }
            (
                TableKind::Super {
                    schemas: a,
                    tag_schema: ta,
                    ..
                },
                TableKind::Super {
                    schemas: b,
                    tag_schema: tb,
                    ..
                },
            ) => *a.read() == *b.read() && *ta.read() == *tb.read(),
            (
                TableKind::Child {
                    super_uid: sa,
                    tags: ta,
                },
                TableKind::Child {
                    super_uid: sb,
                    tags: tb,
                },
            ) => sa == sb && *ta.read() == *tb.read(),
            (
                TableKind::Stream {
                    schemas: a,
                    sql: qa,
                },
                TableKind::Stream {
                    schemas: b,
                    sql: qb,
                },
            ) => qa == qb && *a.read() == *b.read(),
            _ => false,
        }
    }
}

//! The configuration descriptor from which tables are constructed.

use crate::error::MetaError;
use crate::id::{TableTid, TableUid};
use crate::name::TableName;
use crate::schema::Schema;
use crate::tagrow::TagRow;

/// Maximum length of a stream table's query text, in bytes. Bounded by the
/// `u16` length prefix the text is encoded with.
pub const MAX_SQL_LEN: usize = u16::MAX as usize;

/// The table kinds a caller may request.
///
/// Super tables are never requested directly; they are synthesized while
/// creating the first child of a family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfgKind {
    Normal,
    Child,
    Stream,
}

/// Builder-style value collecting the fields needed to construct a table.
///
/// Which fields are required depends on the kind; [`TableCfg::validate`]
/// rejects invalid combinations with
/// [`MetaError::InvalidCreateMessage`].
#[derive(Clone, Debug)]
pub struct TableCfg {
    pub(crate) kind: CfgKind,
    pub(crate) uid: TableUid,
    pub(crate) tid: TableTid,
    pub(crate) name: Option<TableName>,
    pub(crate) schema: Option<Schema>,
    pub(crate) tag_schema: Option<Schema>,
    pub(crate) super_name: Option<TableName>,
    pub(crate) super_uid: Option<TableUid>,
    pub(crate) tag_values: Option<TagRow>,
    pub(crate) sql: Option<String>,
}

impl TableCfg {
    pub fn new(kind: CfgKind, uid: TableUid, tid: TableTid) -> Self {
        Self {
            kind,
            uid,
            tid,
            name: None,
            schema: None,
            tag_schema: None,
            super_name: None,
            super_uid: None,
            tag_values: None,
            sql: None,
        }
    }

    pub fn name(mut self, name: TableName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn tag_schema(mut self, tag_schema: Schema) -> Self {
        self.tag_schema = Some(tag_schema);
        self
    }

    pub fn super_name(mut self, super_name: TableName) -> Self {
        self.super_name = Some(super_name);
        self
    }

    pub fn super_uid(mut self, super_uid: TableUid) -> Self {
        self.super_uid = Some(super_uid);
        self
    }

    pub fn tag_values(mut self, tag_values: TagRow) -> Self {
        self.tag_values = Some(tag_values);
        self
    }

    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn kind(&self) -> CfgKind {
        self.kind
    }

    pub fn uid(&self) -> TableUid {
        self.uid
    }

    pub fn tid(&self) -> TableTid {
        self.tid
    }

    /// Checks the field combination against the requested kind.
    pub fn validate(&self) -> Result<(), MetaError> {
        let fail = |reason: &str| Err(MetaError::InvalidCreateMessage(reason.to_owned()));

        if self.uid.is_none() {
            return fail("table uid must not be the sentinel");
        }
        if self.name.is_none() {
            return fail("table name is required");
        }
        if self.schema.is_none() {
            return fail("column schema is required");
        }

        match self.kind {
            CfgKind::Child => {
                if self.tag_schema.is_none() {
                    return fail("child tables require a tag schema");
                }
                if self.tag_schema.as_ref().is_some_and(|s| s.cols().is_empty()) {
                    return fail("tag schema must declare at least one column");
                }
                if self.super_name.is_none() {
                    return fail("child tables require a super table name");
                }
                match self.super_uid {
                    None => return fail("child tables require a super table uid"),
                    Some(uid) if uid.is_none() => {
                        return fail("super table uid must not be the sentinel")
                    }
                    Some(_) => {}
                }
                if self.sql.is_some() {
                    return fail("child tables carry no query text");
                }
                // Every supplied tag value must belong to the tag schema,
                // with a matching type, and variable-length payloads must
                // stay strictly below the declared column width.
                if let (Some(row), Some(tags)) = (&self.tag_values, &self.tag_schema) {
                    for (col_id, val) in row.iter() {
                        let Some(col) = tags.col(col_id) else {
                            return fail("tag value for a column absent from the tag schema");
                        };
                        if val.ty() != Some(col.ty) {
                            return fail("tag value type disagrees with the tag schema");
                        }
                        if col.ty.is_var_len() && val.payload_len() >= col.bytes {
                            return fail("tag value length exceeds the schema width");
                        }
                        if val.payload_len() > u16::MAX as u32 {
                            return fail("tag value is too long to encode");
                        }
                    }
                }
            }
            CfgKind::Normal | CfgKind::Stream => {
                if self.tag_schema.is_some() {
                    return fail("only child and super tables carry a tag schema");
                }
                if self.tag_values.is_some() {
                    return fail("only child tables carry tag values");
                }
                if self.super_name.is_some() || self.super_uid.is_some() {
                    return fail("only child tables reference a super table");
                }
                match self.kind {
                    CfgKind::Stream => match &self.sql {
                        None => return fail("stream tables require their source query text"),
                        Some(sql) if sql.len() > MAX_SQL_LEN => {
                            return fail("query text is too long")
                        }
                        Some(_) => {}
                    },
                    CfgKind::Normal if self.sql.is_some() => {
                        return fail("normal tables carry no query text")
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColType, ColumnSchema};

    fn schema(version: i32) -> Schema {
        Schema::new(version, vec![ColumnSchema::fixed(1u16, ColType::Timestamp)])
    }

    fn tag_schema() -> Schema {
        Schema::new(1, vec![ColumnSchema::fixed(10u16, ColType::Int)])
    }

    fn name(s: &str) -> TableName {
        TableName::from_str(s).unwrap()
    }

    #[test]
    fn normal_cfg_validates() {
        let cfg = TableCfg::new(CfgKind::Normal, TableUid(9), TableTid(1))
            .name(name("n"))
            .schema(schema(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tag_schema_on_normal_rejected() {
        let cfg = TableCfg::new(CfgKind::Normal, TableUid(9), TableTid(1))
            .name(name("n"))
            .schema(schema(1))
            .tag_schema(tag_schema());
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));
    }

    #[test]
    fn child_requires_super_fields() {
        let cfg = TableCfg::new(CfgKind::Child, TableUid(1001), TableTid(5))
            .name(name("c"))
            .schema(schema(1))
            .tag_schema(tag_schema());
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));

        let cfg = cfg.super_name(name("s")).super_uid(TableUid::NONE);
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));

        let cfg = cfg.super_uid(TableUid(77));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stream_requires_sql() {
        let cfg = TableCfg::new(CfgKind::Stream, TableUid(8), TableTid(2))
            .name(name("st"))
            .schema(schema(1));
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));
        assert!(cfg.sql("select avg(v) from t").validate().is_ok());
    }

    #[test]
    fn oversized_sql_rejected() {
        let cfg = TableCfg::new(CfgKind::Stream, TableUid(8), TableTid(2))
            .name(name("st"))
            .schema(schema(1))
            .sql("x".repeat(MAX_SQL_LEN + 1));
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));
    }

    #[test]
    fn oversized_tag_value_rejected() {
        let tags = Schema::new(1, vec![ColumnSchema::var(10u16, ColType::Binary, 4)]);
        let row: TagRow = [(
            crate::id::ColId(10),
            crate::tagrow::TagVal::Binary(vec![0; 4]),
        )]
        .into_iter()
        .collect();
        let cfg = TableCfg::new(CfgKind::Child, TableUid(1001), TableTid(5))
            .name(name("c"))
            .schema(schema(1))
            .tag_schema(tags)
            .super_name(name("s"))
            .super_uid(TableUid(77))
            .tag_values(row);
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));
    }

    #[test]
    fn tag_value_outside_tag_schema_rejected() {
        let row: TagRow = [(crate::id::ColId(99), crate::tagrow::TagVal::Int(1))]
            .into_iter()
            .collect();
        let cfg = TableCfg::new(CfgKind::Child, TableUid(1001), TableTid(5))
            .name(name("c"))
            .schema(schema(1))
            .tag_schema(tag_schema())
            .super_name(name("s"))
            .super_uid(TableUid(77))
            .tag_values(row);
        assert!(matches!(
            cfg.validate(),
            Err(MetaError::InvalidCreateMessage(_))
        ));
    }
}

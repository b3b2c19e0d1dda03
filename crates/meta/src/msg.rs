//! Create and update messages as they arrive from the transport.
//!
//! Messages travel in network byte order and are swapped to host order on
//! receipt. The encoders exist for the sending side (and the test doubles
//! standing in for it).

use tsrepo_actionlog::buf::{BufReader as _, BufWriter as _, DecodeError};

use crate::cfg::{CfgKind, TableCfg};
use crate::id::{ColId, TableTid, TableUid};
use crate::name::TableName;
use crate::schema::{ColType, ColumnSchema, Schema};
use crate::tagrow::{TagRow, TagVal};

const MSG_KIND_NORMAL: u8 = 0;
const MSG_KIND_CHILD: u8 = 2;
const MSG_KIND_STREAM: u8 = 3;

fn kind_byte(kind: CfgKind) -> u8 {
    match kind {
        CfgKind::Normal => MSG_KIND_NORMAL,
        CfgKind::Child => MSG_KIND_CHILD,
        CfgKind::Stream => MSG_KIND_STREAM,
    }
}

fn kind_from_byte(tag: u8) -> Result<CfgKind, DecodeError> {
    match tag {
        MSG_KIND_NORMAL => Ok(CfgKind::Normal),
        MSG_KIND_CHILD => Ok(CfgKind::Child),
        MSG_KIND_STREAM => Ok(CfgKind::Stream),
        _ => Err(DecodeError::InvalidTag {
            tag,
            ty: "CfgKind",
        }),
    }
}

/// A create-table request.
///
/// Layout (big-endian): `u8 kind, u64 uid, u32 tid, u64 super_uid,
/// i32 sversion, i32 tversion, u16 num_columns, u16 num_tags,
/// u32 tag_data_len`, then the name, the super name (children only), the
/// column schemas, the tag column schemas, the tag-value block, and the
/// query text (streams only).
#[derive(Clone, Debug, PartialEq)]
pub struct CreateTableMsg {
    pub kind: CfgKind,
    pub uid: TableUid,
    pub tid: TableTid,
    /// Sentinel unless `kind` is `Child`.
    pub super_uid: TableUid,
    /// Version of the column schema.
    pub sversion: i32,
    /// Version of the tag schema; meaningful for children only.
    pub tversion: i32,
    pub name: TableName,
    pub super_name: Option<TableName>,
    pub columns: Vec<ColumnSchema>,
    pub tags: Vec<ColumnSchema>,
    pub tag_values: TagRow,
    pub sql: Option<String>,
}

impl CreateTableMsg {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut tag_block = Vec::new();
        for (col_id, val) in self.tag_values.iter() {
            let ty = val.ty().expect("null values are never sent in a tag block");
            tag_block.put_u16_be(col_id.0);
            tag_block.put_u8(ty as u8);
            val.encode_be(&mut tag_block)?;
        }

        let mut out = Vec::new();
        out.put_u8(kind_byte(self.kind));
        out.put_u64_be(self.uid.0);
        out.put_u32_be(self.tid.0);
        out.put_u64_be(self.super_uid.0);
        out.put_i32_be(self.sversion);
        out.put_i32_be(self.tversion);
        out.put_u16_be(self.columns.len() as u16);
        out.put_u16_be(self.tags.len() as u16);
        out.put_u32_be(tag_block.len() as u32);
        out.put_str_be(&self.name)?;
        if let Some(super_name) = &self.super_name {
            out.put_str_be(super_name)?;
        }
        for col in &self.columns {
            col.encode_be(&mut out);
        }
        for tag in &self.tags {
            tag.encode_be(&mut out);
        }
        out.put_slice(&tag_block);
        if let Some(sql) = &self.sql {
            out.put_str_be(sql)?;
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = bytes;

        let kind = kind_from_byte(reader.get_u8()?)?;
        let uid = TableUid(reader.get_u64_be()?);
        let tid = TableTid(reader.get_u32_be()?);
        let super_uid = TableUid(reader.get_u64_be()?);
        let sversion = reader.get_i32_be()?;
        let tversion = reader.get_i32_be()?;
        let num_columns = reader.get_u16_be()? as usize;
        let num_tags = reader.get_u16_be()? as usize;
        let tag_data_len = reader.get_u32_be()? as usize;

        let name_str = reader.get_str_be()?;
        let name = TableName::from_str(name_str).ok_or(DecodeError::TooLong {
            what: "table name",
            len: name_str.len(),
        })?;
        let super_name = if kind == CfgKind::Child {
            let super_str = reader.get_str_be()?;
            Some(TableName::from_str(super_str).ok_or(DecodeError::TooLong {
                what: "super table name",
                len: super_str.len(),
            })?)
        } else {
            None
        };

        let mut columns = Vec::with_capacity(num_columns);
        for _ in 0..num_columns {
            columns.push(ColumnSchema::decode_be(&mut reader)?);
        }
        let mut tags = Vec::with_capacity(num_tags);
        for _ in 0..num_tags {
            tags.push(ColumnSchema::decode_be(&mut reader)?);
        }

        let mut tag_block = reader.get_slice(tag_data_len)?;
        let mut tag_values = TagRow::new();
        while tag_block.remaining() > 0 {
            let col_id = ColId(tag_block.get_u16_be()?);
            let ty = ColType::from_u8(tag_block.get_u8()?)?;
            tag_values.set(col_id, TagVal::decode_be(&mut tag_block, ty)?);
        }

        let sql = if kind == CfgKind::Stream {
            Some(reader.get_str_be()?.to_owned())
        } else {
            None
        };

        Ok(Self {
            kind,
            uid,
            tid,
            super_uid,
            sversion,
            tversion,
            name,
            super_name,
            columns,
            tags,
            tag_values,
            sql,
        })
    }

    /// Turns the message into the configuration descriptor the registry
    /// consumes.
    pub fn into_cfg(self) -> TableCfg {
        let mut cfg = TableCfg::new(self.kind, self.uid, self.tid)
            .name(self.name)
            .schema(Schema::new(self.sversion, self.columns));
        if self.kind == CfgKind::Child {
            cfg = cfg
                .tag_schema(Schema::new(self.tversion, self.tags))
                .super_uid(self.super_uid)
                .tag_values(self.tag_values);
            if let Some(super_name) = self.super_name {
                cfg = cfg.super_name(super_name);
            }
        }
        if let Some(sql) = self.sql {
            cfg = cfg.sql(sql);
        }
        cfg
    }
}

/// A tag-value update request.
///
/// Layout (big-endian): `u64 uid, u32 tid, i32 tversion, u16 col_id,
/// u8 type, u32 bytes, u16 data_len`, then `data_len` bytes of encoded
/// value data.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateTagValMsg {
    pub uid: TableUid,
    pub tid: TableTid,
    /// Tag schema version the writer observed.
    pub tver: i32,
    pub col_id: ColId,
    pub ty: ColType,
    /// On-row width of the column per the writer's schema.
    pub bytes: u32,
    pub value: TagVal,
}

impl UpdateTagValMsg {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut data = Vec::new();
        self.value.encode_be(&mut data)?;

        let mut out = Vec::new();
        out.put_u64_be(self.uid.0);
        out.put_u32_be(self.tid.0);
        out.put_i32_be(self.tver);
        out.put_u16_be(self.col_id.0);
        out.put_u8(self.ty as u8);
        out.put_u32_be(self.bytes);
        out.put_u16_be(data.len() as u16);
        out.put_slice(&data);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = bytes;
        let uid = TableUid(reader.get_u64_be()?);
        let tid = TableTid(reader.get_u32_be()?);
        let tver = reader.get_i32_be()?;
        let col_id = ColId(reader.get_u16_be()?);
        let ty = ColType::from_u8(reader.get_u8()?)?;
        let bytes_ = reader.get_u32_be()?;
        let data_len = reader.get_u16_be()? as usize;
        let mut data = reader.get_slice(data_len)?;
        let value = TagVal::decode_be(&mut data, ty)?;
        if data.remaining() != 0 {
            // The declared length must cover exactly one value.
            return Err(DecodeError::TooLong {
                what: "tag value data",
                len: data_len,
            });
        }
        Ok(Self {
            uid,
            tid,
            tver,
            col_id,
            ty,
            bytes: bytes_,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn name(s: &str) -> TableName {
        TableName::from_str(s).unwrap()
    }

    fn child_msg() -> CreateTableMsg {
        CreateTableMsg {
            kind: CfgKind::Child,
            uid: TableUid(1001),
            tid: TableTid(5),
            super_uid: TableUid(77),
            sversion: 1,
            tversion: 1,
            name: name("c"),
            super_name: Some(name("s")),
            columns: vec![
                ColumnSchema::fixed(1u16, ColType::Timestamp),
                ColumnSchema::fixed(2u16, ColType::Int),
            ],
            tags: vec![ColumnSchema::fixed(10u16, ColType::Int)],
            tag_values: [(ColId(10), TagVal::Int(42))].into_iter().collect(),
            sql: None,
        }
    }

    #[test]
    fn create_msg_roundtrip() {
        let msg = child_msg();
        assert_eq!(CreateTableMsg::decode(&msg.encode().unwrap()).unwrap(), msg);

        let stream = CreateTableMsg {
            kind: CfgKind::Stream,
            uid: TableUid(8),
            tid: TableTid(2),
            super_uid: TableUid::NONE,
            sversion: 1,
            tversion: 0,
            name: name("st"),
            super_name: None,
            columns: vec![ColumnSchema::fixed(1u16, ColType::Timestamp)],
            tags: vec![],
            tag_values: TagRow::new(),
            sql: Some("select avg(v) from n interval(1m)".to_owned()),
        };
        assert_eq!(CreateTableMsg::decode(&stream.encode().unwrap()).unwrap(), stream);
    }

    #[test]
    fn create_msg_header_is_big_endian() {
        let buf = child_msg().encode().unwrap();
        // kind, then the uid in network byte order.
        assert_eq!(buf[0], 2);
        assert_eq!(buf[1..9], 1001u64.to_be_bytes());
    }

    #[test]
    fn into_cfg_validates_as_child() {
        let cfg = child_msg().into_cfg();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.kind(), CfgKind::Child);
        assert_eq!(cfg.uid(), TableUid(1001));
    }

    #[test]
    fn update_msg_roundtrip() {
        let msg = UpdateTagValMsg {
            uid: TableUid(1001),
            tid: TableTid(5),
            tver: 1,
            col_id: ColId(10),
            ty: ColType::Int,
            bytes: 4,
            value: TagVal::Int(99),
        };
        assert_eq!(UpdateTagValMsg::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn update_msg_declares_data_len() {
        let msg = UpdateTagValMsg {
            uid: TableUid(1001),
            tid: TableTid(5),
            tver: 1,
            col_id: ColId(10),
            ty: ColType::Int,
            bytes: 4,
            value: TagVal::Int(99),
        };
        let buf = msg.encode().unwrap();
        // Fixed header is uid(8) + tid(4) + tversion(4) + col_id(2) +
        // type(1) + bytes(4); data_len follows, then the value data.
        assert_eq!(buf[23..25], 4u16.to_be_bytes());
        assert_eq!(buf.len(), 25 + 4);

        // A data_len that does not cover exactly one value is rejected.
        let mut short = buf.clone();
        short[23..25].copy_from_slice(&5u16.to_be_bytes());
        short.push(0);
        assert!(UpdateTagValMsg::decode(&short).is_err());
    }
}

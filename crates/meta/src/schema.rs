//! Column schemas and the bounded, versioned schema history.

use std::collections::VecDeque;

use tsrepo_actionlog::buf::{BufReader, BufWriter, DecodeError};

use crate::id::ColId;

/// Column schemas a table may be at most this many versions deep.
pub const MAX_SCHEMAS_PER_TABLE: usize = 16;

/// Column value types understood by the shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColType {
    Timestamp = 1,
    Bool = 2,
    TinyInt = 3,
    SmallInt = 4,
    Int = 5,
    BigInt = 6,
    Float = 7,
    Double = 8,
    Binary = 9,
    NChar = 10,
}

impl ColType {
    pub fn from_u8(tag: u8) -> Result<Self, DecodeError> {
        use ColType::*;
        Ok(match tag {
            1 => Timestamp,
            2 => Bool,
            3 => TinyInt,
            4 => SmallInt,
            5 => Int,
            6 => BigInt,
            7 => Float,
            8 => Double,
            9 => Binary,
            10 => NChar,
            _ => return Err(DecodeError::InvalidTag { tag, ty: "ColType" }),
        })
    }

    /// Width in bytes of a value of this type, or `None` for the
    /// variable-length types.
    pub fn fixed_len(self) -> Option<u32> {
        use ColType::*;
        match self {
            Bool | TinyInt => Some(1),
            SmallInt => Some(2),
            Int | Float => Some(4),
            BigInt | Double | Timestamp => Some(8),
            Binary | NChar => None,
        }
    }

    pub fn is_var_len(self) -> bool {
        self.fixed_len().is_none()
    }
}

/// One column of a schema: id, type, and on-row width in bytes.
///
/// For fixed types `bytes` is the natural width; for variable-length types it
/// is the declared capacity of the column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub col_id: ColId,
    pub ty: ColType,
    pub bytes: u32,
}

impl ColumnSchema {
    /// A fixed-width column with its natural byte width.
    pub fn fixed(col_id: impl Into<ColId>, ty: ColType) -> Self {
        let bytes = ty.fixed_len().expect("fixed() used with a var-len type");
        Self {
            col_id: col_id.into(),
            ty,
            bytes,
        }
    }

    /// A variable-length column with the given capacity.
    pub fn var(col_id: impl Into<ColId>, ty: ColType, bytes: u32) -> Self {
        debug_assert!(ty.is_var_len());
        Self {
            col_id: col_id.into(),
            ty,
            bytes,
        }
    }

    pub fn encode(&self, out: &mut impl BufWriter) {
        out.put_u8(self.ty as u8);
        out.put_u16(self.col_id.0);
        out.put_u32(self.bytes);
    }

    pub fn decode<'a>(reader: &mut impl BufReader<'a>) -> Result<Self, DecodeError> {
        let ty = ColType::from_u8(reader.get_u8()?)?;
        let col_id = ColId(reader.get_u16()?);
        let bytes = reader.get_u32()?;
        Ok(Self { col_id, ty, bytes })
    }

    pub(crate) fn encode_be(&self, out: &mut impl BufWriter) {
        out.put_u8(self.ty as u8);
        out.put_u16_be(self.col_id.0);
        out.put_u32_be(self.bytes);
    }

    pub(crate) fn decode_be<'a>(reader: &mut impl BufReader<'a>) -> Result<Self, DecodeError> {
        let ty = ColType::from_u8(reader.get_u8()?)?;
        let col_id = ColId(reader.get_u16_be()?);
        let bytes = reader.get_u32_be()?;
        Ok(Self { col_id, ty, bytes })
    }
}

/// A versioned column schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    version: i32,
    cols: Vec<ColumnSchema>,
}

impl Schema {
    pub fn new(version: i32, cols: Vec<ColumnSchema>) -> Self {
        Self { version, cols }
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn cols(&self) -> &[ColumnSchema] {
        &self.cols
    }

    pub fn num_cols(&self) -> u32 {
        self.cols.len() as u32
    }

    /// Looks a column up by id.
    pub fn col(&self, col_id: ColId) -> Option<&ColumnSchema> {
        self.cols.iter().find(|c| c.col_id == col_id)
    }

    /// Width in bytes of a full row of this schema.
    pub fn row_bytes(&self) -> u32 {
        self.cols.iter().map(|c| c.bytes).sum()
    }

    pub fn encode(&self, out: &mut impl BufWriter) {
        out.put_i32(self.version);
        out.put_u16(self.cols.len() as u16);
        for col in &self.cols {
            col.encode(out);
        }
    }

    pub fn decode<'a>(reader: &mut impl BufReader<'a>) -> Result<Self, DecodeError> {
        let version = reader.get_i32()?;
        let ncols = reader.get_u16()? as usize;
        let mut cols = Vec::with_capacity(ncols);
        for _ in 0..ncols {
            cols.push(ColumnSchema::decode(reader)?);
        }
        Ok(Self { version, cols })
    }
}

/// Ordered sequence of schemas of a non-child table.
///
/// Newest last; versions strictly increasing but not necessarily contiguous.
/// Bounded by [`MAX_SCHEMAS_PER_TABLE`]: when full, the oldest entry is
/// evicted to admit a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaHistory {
    entries: VecDeque<Schema>,
}

impl SchemaHistory {
    pub fn new(initial: Schema) -> Self {
        let mut entries = VecDeque::with_capacity(MAX_SCHEMAS_PER_TABLE);
        entries.push_back(initial);
        Self { entries }
    }

    /// The newest schema. The history is never empty.
    pub fn latest(&self) -> &Schema {
        self.entries.back().expect("schema history is never empty")
    }

    /// Exact-version lookup; `None` if `version` is absent (evicted or never
    /// seen).
    pub fn get(&self, version: i32) -> Option<&Schema> {
        self.entries
            .binary_search_by_key(&version, |s| s.version())
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// Appends `schema`, evicting the oldest entry when full.
    ///
    /// Callers must only push a strictly newer version than [`Self::latest`].
    pub fn push(&mut self, schema: Schema) {
        debug_assert!(schema.version() > self.latest().version());
        if self.entries.len() == MAX_SCHEMAS_PER_TABLE {
            self.entries.pop_front();
        }
        self.entries.push_back(schema);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.entries.iter()
    }

    pub fn encode(&self, out: &mut impl BufWriter) {
        out.put_u8(self.entries.len() as u8);
        for schema in &self.entries {
            schema.encode(out);
        }
    }

    pub fn decode<'a>(reader: &mut impl BufReader<'a>) -> Result<Self, DecodeError> {
        let n = reader.get_u8()? as usize;
        if n == 0 || n > MAX_SCHEMAS_PER_TABLE {
            return Err(DecodeError::InvalidTag {
                tag: n as u8,
                ty: "SchemaHistory length",
            });
        }
        let mut entries = VecDeque::with_capacity(n);
        for _ in 0..n {
            entries.push_back(Schema::decode(reader)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn schema(version: i32) -> Schema {
        Schema::new(
            version,
            vec![
                ColumnSchema::fixed(1u16, ColType::Timestamp),
                ColumnSchema::fixed(2u16, ColType::Int),
            ],
        )
    }

    #[test]
    fn row_bytes_sums_column_widths() {
        let s = Schema::new(
            1,
            vec![
                ColumnSchema::fixed(1u16, ColType::Timestamp),
                ColumnSchema::fixed(2u16, ColType::Int),
                ColumnSchema::var(3u16, ColType::Binary, 64),
            ],
        );
        assert_eq!(s.row_bytes(), 8 + 4 + 64);
        assert_eq!(s.num_cols(), 3);
    }

    #[test]
    fn history_fifo_eviction() {
        let mut hist = SchemaHistory::new(schema(1));
        for v in 2..=(MAX_SCHEMAS_PER_TABLE as i32 + 1) {
            hist.push(schema(v));
        }
        assert_eq!(hist.len(), MAX_SCHEMAS_PER_TABLE);
        assert_eq!(hist.iter().next().unwrap().version(), 2);
        assert_eq!(hist.latest().version(), MAX_SCHEMAS_PER_TABLE as i32 + 1);
        assert_eq!(hist.get(1), None);
        assert_eq!(hist.get(2).unwrap().version(), 2);
    }

    #[test]
    fn version_lookup_is_exact() {
        let mut hist = SchemaHistory::new(schema(3));
        hist.push(schema(7));
        hist.push(schema(8));
        assert_eq!(hist.get(7).unwrap().version(), 7);
        // Versions need not be contiguous; gaps are misses, not neighbors.
        assert_eq!(hist.get(5), None);
        assert_eq!(hist.get(9), None);
    }

    #[test]
    fn history_roundtrip() {
        let mut hist = SchemaHistory::new(schema(1));
        hist.push(schema(4));

        let mut buf = Vec::new();
        hist.encode(&mut buf);
        let decoded = SchemaHistory::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, hist);
    }
}

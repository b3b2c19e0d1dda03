//! Identifier newtypes shared across the crate.

use derive_more::{From, Into};

/// Globally unique 64-bit table identifier; the key of the uid map.
#[derive(
    Clone, Copy, Debug, Default, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd,
)]
pub struct TableUid(pub u64);

impl TableUid {
    /// Sentinel meaning "no table"; also the invalid-super uid.
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for TableUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Shard-local numeric table id; the index into the slot array.
///
/// Valid slots are `[1, max_tables)`; slot 0 is reserved. Super tables carry
/// [`TableTid::NONE`].
#[derive(
    Clone, Copy, Debug, Default, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd,
)]
pub struct TableTid(pub u32);

impl TableTid {
    /// Sentinel carried by tables that own no slot.
    pub const NONE: Self = Self(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TableTid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            self.0.fmt(f)
        }
    }
}

/// Column identifier within a schema or tag-value row.
#[derive(
    Clone, Copy, Debug, Default, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd,
)]
pub struct ColId(pub u16);

impl std::fmt::Display for ColId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//! The per-super-table secondary index over the designated tag column.

use std::collections::{btree_set, BTreeSet};
use std::ops::Bound;

use crate::id::TableUid;
use crate::schema::ColType;
use crate::tagrow::TagVal;

/// Entry of the index: the tag key plus the child's uid.
///
/// The uid doubles as the tie-breaker, so several children sharing the same
/// tag value coexist and removal disambiguates by table identity.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct IndexKey {
    key: TagVal,
    uid: TableUid,
}

/// Secondary index of a super table: designated-tag-column value → child.
#[derive(Debug)]
pub struct TagIndex {
    key_type: ColType,
    idx: BTreeSet<IndexKey>,
}

impl TagIndex {
    pub fn new(key_type: ColType) -> Self {
        Self {
            key_type,
            idx: BTreeSet::new(),
        }
    }

    /// Type of the column this index is keyed on.
    pub fn key_type(&self) -> ColType {
        self.key_type
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    pub fn insert(&mut self, key: TagVal, uid: TableUid) -> bool {
        self.idx.insert(IndexKey { key, uid })
    }

    /// Removes the entry for exactly this child among all entries with an
    /// equal key. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &TagVal, uid: TableUid) -> bool {
        self.idx.remove(&IndexKey {
            key: key.clone(),
            uid,
        })
    }

    /// Iterator over the uids of all children whose tag key equals `key`.
    pub fn seek<'a>(&'a self, key: &TagVal) -> TagIndexRangeIter<'a> {
        let start = Bound::Included(IndexKey {
            key: key.clone(),
            uid: TableUid(u64::MIN),
        });
        let end = Bound::Included(IndexKey {
            key: key.clone(),
            uid: TableUid(u64::MAX),
        });
        TagIndexRangeIter {
            range: self.idx.range((start, end)),
        }
    }

    /// Iterator over every `(key, uid)` entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagVal, TableUid)> {
        self.idx.iter().map(|entry| (&entry.key, entry.uid))
    }

    /// Iterator over the uids of every indexed child.
    pub fn uids(&self) -> impl Iterator<Item = TableUid> + '_ {
        self.idx.iter().map(|entry| entry.uid)
    }
}

/// Iterator over the children matching one tag key.
pub struct TagIndexRangeIter<'a> {
    range: btree_set::Range<'a, IndexKey>,
}

impl Iterator for TagIndexRangeIter<'_> {
    type Item = TableUid;

    fn next(&mut self) -> Option<Self::Item> {
        self.range.next().map(|entry| entry.uid)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn seek_yields_only_equal_keys() {
        let mut idx = TagIndex::new(ColType::Int);
        idx.insert(TagVal::Int(41), TableUid(1));
        idx.insert(TagVal::Int(42), TableUid(2));
        idx.insert(TagVal::Int(43), TableUid(3));

        assert_eq!(idx.seek(&TagVal::Int(42)).collect::<Vec<_>>(), [TableUid(2)]);
        assert_eq!(idx.seek(&TagVal::Int(44)).count(), 0);
    }

    #[test]
    fn equal_keys_disambiguated_by_identity() {
        let mut idx = TagIndex::new(ColType::Int);
        idx.insert(TagVal::Int(7), TableUid(1));
        idx.insert(TagVal::Int(7), TableUid(2));
        idx.insert(TagVal::Int(7), TableUid(3));
        assert_eq!(idx.len(), 3);

        assert!(idx.remove(&TagVal::Int(7), TableUid(2)));
        assert!(!idx.remove(&TagVal::Int(7), TableUid(2)));
        assert_eq!(
            idx.seek(&TagVal::Int(7)).collect::<Vec<_>>(),
            [TableUid(1), TableUid(3)]
        );
    }

    #[test]
    fn null_keys_coexist_with_values() {
        let mut idx = TagIndex::new(ColType::Int);
        idx.insert(TagVal::Null, TableUid(1));
        idx.insert(TagVal::Int(0), TableUid(2));

        assert_eq!(idx.seek(&TagVal::Null).collect::<Vec<_>>(), [TableUid(1)]);
        assert_eq!(idx.seek(&TagVal::Int(0)).collect::<Vec<_>>(), [TableUid(2)]);
    }
}

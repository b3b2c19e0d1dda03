//! Length-bounded table names.

use std::ops::Deref;

/// Maximum length of a table name, in bytes (not characters).
pub const MAX_NAME_LEN: usize = 192;

/// An owned table name, at most [`MAX_NAME_LEN`] bytes long.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct TableName {
    inner: Box<str>,
}

impl TableName {
    /// Construct `Some(Self)` from a string slice,
    /// or `None` if the argument is longer than [`MAX_NAME_LEN`] bytes.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        (s.len() <= MAX_NAME_LEN).then(|| Self { inner: s.into() })
    }

    /// Extract a string slice containing the entire name.
    pub fn as_str(&self) -> &str {
        self
    }
}

impl Deref for TableName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.inner.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_accepts_short(s in "[[:ascii:]]{0,192}") {
            assert_eq!(s.as_str(), TableName::from_str(&s).unwrap().as_str());
        }

        #[test]
        fn prop_rejects_long(s in "\\w{193,220}") {
            assert!(TableName::from_str(&s).is_none());
        }
    }
}

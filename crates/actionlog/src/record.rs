//! Framing of a single action record.
//!
//! Every metadata mutation that must survive restart is serialized as one
//! record:
//!
//! ```text
//! | act: u8 | uid: u64 | len: u32 | payload (len bytes) | checksum: u32 |
//! ```
//!
//! All integers little-endian. The trailing crc32c covers every byte before
//! it. The payload is the binary encoding of a table for [`ActionKind::UpdateMeta`]
//! and empty for [`ActionKind::DropMeta`].

use crc32c::crc32c;
use thiserror::Error;

use crate::buf::{BufReader as _, BufWriter as _, DecodeError};

/// A checksum mismatch was detected.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("checksum mismatch")]
pub struct ChecksumMismatch;

/// Error decoding an [`ActionRecord`] from its framed byte form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Checksum(#[from] ChecksumMismatch),
    #[error("{extra} unconsumed bytes after record payload")]
    Trailing { extra: usize },
}

/// What a record instructs the restore pass to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionKind {
    /// Insert or replace the table encoded in the payload.
    UpdateMeta = 1,
    /// Remove the table identified by the record's uid.
    DropMeta = 2,
}

impl ActionKind {
    fn from_u8(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            1 => Ok(Self::UpdateMeta),
            2 => Ok(Self::DropMeta),
            _ => Err(DecodeError::InvalidTag {
                tag,
                ty: "ActionKind",
            }),
        }
    }
}

/// One entry of the action log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRecord {
    pub act: ActionKind,
    pub uid: u64,
    /// Encoded table for `UpdateMeta`, empty for `DropMeta`.
    pub payload: Vec<u8>,
}

impl ActionRecord {
    /// Bytes of framing around the payload: act + uid + len + checksum.
    pub const FRAMING_LEN: usize = 1 + 8 + 4 + 4;

    pub fn update(uid: u64, payload: Vec<u8>) -> Self {
        Self {
            act: ActionKind::UpdateMeta,
            uid,
            payload,
        }
    }

    pub fn drop(uid: u64) -> Self {
        Self {
            act: ActionKind::DropMeta,
            uid,
            payload: Vec::new(),
        }
    }

    /// Length in bytes of this record in its framed form.
    pub fn encoded_len(&self) -> usize {
        Self::FRAMING_LEN + self.payload.len()
    }

    /// Serialize `self` into its framed byte form, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.put_u8(self.act as u8);
        buf.put_u64(self.uid);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        let crc = crc32c(&buf);
        buf.put_u32(crc);
        buf
    }

    /// Decode one record from `bytes`, verifying the trailing checksum.
    ///
    /// `bytes` must contain exactly one framed record; unconsumed bytes are
    /// rejected rather than ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < Self::FRAMING_LEN {
            return Err(DecodeError::BufferLength {
                want: Self::FRAMING_LEN,
                have: bytes.len(),
            }
            .into());
        }
        let (content, mut tail) = bytes.split_at(bytes.len() - 4);
        let crc = tail.get_u32()?;
        if crc32c(content) != crc {
            return Err(ChecksumMismatch.into());
        }

        let mut reader = content;
        let act = ActionKind::from_u8(reader.get_u8()?)?;
        let uid = reader.get_u64()?;
        let len = reader.get_u32()? as usize;
        let payload = reader.get_slice(len)?.to_vec();
        if reader.remaining() != 0 {
            return Err(RecordError::Trailing {
                extra: reader.remaining(),
            });
        }

        Ok(Self { act, uid, payload })
    }
}

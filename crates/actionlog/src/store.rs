//! File-backed store for action records.
//!
//! Layout: a flat append-only file of `u32` little-endian length prefixes,
//! each followed by one framed record (see [`crate::record`]). On open the
//! file is scanned front to back, every record is handed to the restore
//! callback, and the reorg callback runs once after the last record. The
//! store itself does not interpret record contents; checksum verification is
//! the restore callback's business.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use crate::error::{LogError, OpenError};

const HEADER_SIZE: usize = 4;

pub struct ActionStore {
    path: PathBuf,
    file: BufWriter<File>,
    size: u64,
    num_records: u64,
}

impl std::fmt::Debug for ActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionStore")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("num_records", &self.num_records)
            .finish()
    }
}

impl ActionStore {
    /// Opens (creating if absent) the store at `path` and replays it.
    ///
    /// `restore` is invoked once per stored record, in append order, with the
    /// framed record bytes. `reorg` is invoked once after the last record.
    /// A file that ends mid-record aborts the open with [`LogError::Truncated`];
    /// a callback error aborts it with [`OpenError::Restore`].
    pub fn open<E>(
        path: impl AsRef<Path>,
        mut restore: impl FnMut(&[u8]) -> Result<(), E>,
        reorg: impl FnOnce() -> Result<(), E>,
    ) -> Result<Self, OpenError<E>> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(LogError::Io)?;
        }

        let file = fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(LogError::Io)?;
        let size = file.metadata().map_err(LogError::Io)?.len();

        let mut reader = BufReader::new(File::open(path).map_err(LogError::Io)?);
        let mut cursor: u64 = 0;
        let mut num_records: u64 = 0;
        while let Some(record) = read_one(&mut reader, cursor)? {
            restore(&record).map_err(OpenError::Restore)?;
            cursor += (HEADER_SIZE + record.len()) as u64;
            num_records += 1;
        }
        reorg().map_err(OpenError::Restore)?;

        log::debug!(
            "opened action store at {} ({} records, {} bytes)",
            path.display(),
            num_records,
            size
        );

        Ok(Self {
            path: path.to_owned(),
            file: BufWriter::new(file),
            size,
            num_records,
        })
    }

    /// Appends one framed record.
    pub fn append(&mut self, record: &[u8]) -> Result<(), LogError> {
        let len = record.len() as u32;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(record)?;
        self.size += (HEADER_SIZE + record.len()) as u64;
        self.num_records += 1;
        Ok(())
    }

    /// Pushes buffered writes to the OS.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.file.flush()?;
        Ok(())
    }

    /// Does not return until appended data is physically on disk.
    pub fn sync_all(&mut self) -> Result<(), LogError> {
        log::trace!("fsync action store");
        self.flush()?;
        self.file.get_ref().sync_all().map_err(LogError::Io)?;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads one length-prefixed record, or `None` at a clean EOF.
fn read_one(reader: &mut BufReader<File>, offset: u64) -> Result<Option<Vec<u8>>, LogError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
        Ok(()) => {}
    }

    let len = u32::from_le_bytes(header);
    let mut record = vec![0u8; len as usize];
    match reader.read_exact(&mut record) {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(LogError::Truncated { offset }),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(Some(record)),
    }
}

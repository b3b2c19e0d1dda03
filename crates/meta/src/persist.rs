//! Open/close lifecycle binding the registry to its on-disk action store.

use std::path::Path;
use std::sync::Arc;

use itertools::Itertools as _;
use tsrepo_actionlog::{ActionKind, ActionRecord, ActionStore, OpenError};

use crate::error::{MetaError, Result};
use crate::id::TableUid;
use crate::registry::{Meta, MetaHooks, Options};
use crate::table::Table;

/// File name of the action log inside the shard's root directory.
pub const META_FILE: &str = "META";

impl Meta {
    /// Opens the shard's metadata, replaying the action log at
    /// `root/META` and rebuilding the tag indexes.
    ///
    /// A record failing checksum verification or decode aborts the open
    /// with [`MetaError::FileCorrupted`].
    pub fn open(root: impl AsRef<Path>, opts: Options, hooks: Arc<dyn MetaHooks>) -> Result<Meta> {
        let meta = Meta::new(opts, hooks);
        let path = root.as_ref().join(META_FILE);
        let store = ActionStore::open(&path, |bytes| meta.restore_record(bytes), || meta.reorg())
            .map_err(|err| match err {
                OpenError::Restore(e) => e,
                OpenError::Log(e) => MetaError::Log(e),
            })?;
        *meta.store.lock() = Some(store);

        log::debug!(
            "meta open at {}: {} tables, {} supers",
            path.display(),
            meta.n_tables(),
            meta.super_count()
        );
        Ok(meta)
    }

    /// Replays one framed record: an upsert for `UpdateMeta`, a removal for
    /// `DropMeta`. No new action is emitted, and index registration is
    /// deferred to [`Meta::reorg`] because a child's super may not have
    /// been replayed yet.
    fn restore_record(&self, bytes: &[u8]) -> Result<()> {
        let record = ActionRecord::decode(bytes).map_err(MetaError::FileCorrupted)?;
        let mut inner = self.inner.write();
        match record.act {
            ActionKind::UpdateMeta => {
                let table = Table::decode(&mut record.payload.as_slice())
                    .map_err(|e| MetaError::FileCorrupted(e.into()))?;
                let uid = table.uid();
                if let Some(existing) = inner.uid_map.get(&uid).cloned() {
                    // A later record for the same table supersedes the
                    // earlier one wholesale.
                    inner.remove_from_meta(&existing, false);
                }
                inner.add_to_meta(Arc::new(table), false)?;
                log::trace!("restored table {uid}");
            }
            ActionKind::DropMeta => {
                let uid = TableUid(record.uid);
                match inner.uid_map.get(&uid).cloned() {
                    Some(existing) => inner.remove_from_meta(&existing, false),
                    None => log::warn!("drop record for unknown table {uid}; ignored"),
                }
            }
        }
        Ok(())
    }

    /// After all records are replayed, links every child into its super's
    /// tag index.
    fn reorg(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let children = inner
            .tables
            .iter()
            .flatten()
            .filter(|t| t.is_child())
            .cloned()
            .collect_vec();
        for child in &children {
            inner.add_to_index(child)?;
        }
        log::trace!("reorg linked {} child tables", children.len());
        Ok(())
    }

    /// Drains the pending action list into the store.
    ///
    /// Stands in for the commit subsystem's drain of the mutable segment;
    /// a crash before this call loses the corresponding mutations on
    /// restart, a crash after it replays them.
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.store.lock();
        let store = guard.as_mut().ok_or(MetaError::StoreClosed)?;

        let records = self.inner.write().actions.drain().collect_vec();
        if records.is_empty() {
            return Ok(());
        }
        for record in &records {
            store.append(&record.encode())?;
        }
        store.flush()?;
        if self.opts().sync_on_commit {
            store.sync_all()?;
        }
        log::debug!("committed {} action records", records.len());
        Ok(())
    }

    /// Closes the shard's metadata: drains pending actions into the store,
    /// syncs, closes the log, and frees every table.
    pub fn close(self) -> Result<()> {
        {
            let mut guard = self.store.lock();
            if let Some(store) = guard.as_mut() {
                let records = self.inner.write().actions.drain().collect_vec();
                for record in &records {
                    store.append(&record.encode())?;
                }
                store.sync_all()?;
            }
            *guard = None;
        }

        self.inner.write().clear();
        log::debug!("meta closed");
        Ok(())
    }
}

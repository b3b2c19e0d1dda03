//! The shard-wide table registry.
//!
//! One [`Meta`] per storage shard. A single reader/writer lock guards the
//! registry's structure: the slot array, the uid map, the super list, and
//! the running maxima. The contents of an individual table are guarded by
//! the table's own locks (see [`crate::table`]); mutating them through the
//! registry additionally requires that no query or commit runs on the table.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools as _;
use parking_lot::{Mutex, RwLock};
use tsrepo_actionlog::{ActionList, ActionRecord, ActionStore};

use crate::cfg::{CfgKind, TableCfg};
use crate::error::{MetaError, Result};
use crate::id::{ColId, TableTid, TableUid};
use crate::msg::{CreateTableMsg, UpdateTagValMsg};
use crate::schema::{ColType, Schema};
use crate::table::Table;
use crate::tagrow::TagVal;

/// Tunables of a shard's metadata core.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Capacity of the slot array; valid tids are `[1, max_tables)` and
    /// slot 0 is reserved.
    pub max_tables: u32,
    /// Shard id handed to the host's configuration callback.
    pub shard_id: u32,
    /// Whether [`Meta::commit`] fsyncs the store.
    pub sync_on_commit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_tables: 4096,
            shard_id: 0,
            sync_on_commit: true,
        }
    }
}

/// Callbacks consumed from the hosting repository.
pub trait MetaHooks: Send + Sync {
    /// Returns a fresh encoded create-table message for `tid`, used to
    /// bootstrap a newer tag schema when a tag-value update arrives ahead
    /// of it. `None` means the host has no configuration for the table.
    fn table_config(&self, shard_id: u32, tid: TableTid) -> Result<Option<Vec<u8>>> {
        let _ = (shard_id, tid);
        Ok(None)
    }

    /// A stream table is being dropped. Invoked without the registry lock
    /// held; failures are not propagated, so the hook has no error channel.
    fn on_stream_drop(&self, uid: TableUid, sql: &str) {
        let _ = (uid, sql);
    }
}

/// Hooks that do nothing.
pub struct NoHooks;

impl MetaHooks for NoHooks {}

pub struct Meta {
    pub(crate) inner: RwLock<MetaInner>,
    pub(crate) store: Mutex<Option<ActionStore>>,
    hooks: Arc<dyn MetaHooks>,
    opts: Options,
}

impl std::fmt::Debug for Meta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meta").finish_non_exhaustive()
    }
}

pub(crate) struct MetaInner {
    /// Dense slot array; the element at a table's tid holds it.
    pub(crate) tables: Box<[Option<Arc<Table>>]>,
    /// Every registered table of every kind, by uid.
    pub(crate) uid_map: HashMap<TableUid, Arc<Table>>,
    /// Insertion-ordered super tables (they own no tid slot).
    pub(crate) super_list: Vec<Arc<Table>>,
    /// Number of occupied slots.
    n_tables: u32,
    /// Running maxima over all non-child tables' current schemas, used by
    /// the write path to size buffers.
    max_cols: u32,
    max_row_bytes: u32,
    /// Pending actions of the current mutable segment, drained by the
    /// commit path.
    pub(crate) actions: ActionList,
}

impl Meta {
    /// A registry with no backing store; see [`Meta::open`] for the durable
    /// variant.
    pub fn new(opts: Options, hooks: Arc<dyn MetaHooks>) -> Self {
        Self {
            inner: RwLock::new(MetaInner {
                tables: vec![None; opts.max_tables as usize].into_boxed_slice(),
                uid_map: HashMap::new(),
                super_list: Vec::new(),
                n_tables: 0,
                max_cols: 0,
                max_row_bytes: 0,
                actions: ActionList::new(),
            }),
            store: Mutex::new(None),
            hooks,
            opts,
        }
    }

    pub fn opts(&self) -> &Options {
        &self.opts
    }

    pub fn get_by_uid(&self, uid: TableUid) -> Option<Arc<Table>> {
        self.inner.read().uid_map.get(&uid).cloned()
    }

    pub fn get_by_tid(&self, tid: TableTid) -> Option<Arc<Table>> {
        self.inner.read().tables.get(tid.idx()).and_then(Clone::clone)
    }

    /// Newest schema of `table`; a child answers with its super's.
    pub fn get_schema(&self, table: &Table) -> Result<Schema> {
        match table.schemas() {
            Some(schemas) => Ok(schemas.read().latest().clone()),
            None => {
                let sup = self.super_of(table)?;
                let schemas = sup.schemas().expect("super tables own a schema history");
                let schema = schemas.read().latest().clone();
                Ok(schema)
            }
        }
    }

    /// Exact-version schema lookup in the (super's, for a child) history.
    pub fn get_schema_by_version(&self, table: &Table, version: i32) -> Result<Option<Schema>> {
        match table.schemas() {
            Some(schemas) => Ok(schemas.read().get(version).cloned()),
            None => {
                let sup = self.super_of(table)?;
                let schemas = sup.schemas().expect("super tables own a schema history");
                let schema = schemas.read().get(version).cloned();
                Ok(schema)
            }
        }
    }

    /// Tag schema of the family `table` belongs to; `None` for tables
    /// outside a super family.
    pub fn get_tag_schema(&self, table: &Table) -> Option<Schema> {
        if let Some(tag_schema) = table.tag_schema() {
            return Some(tag_schema.read().clone());
        }
        let sup = self.get_by_uid(table.super_uid()?)?;
        let tag_schema = sup.tag_schema()?.read().clone();
        Some(tag_schema)
    }

    /// Schema-checked fetch of one tag value from a child's row.
    ///
    /// Fails if `(ty, bytes)` disagree with the tag schema, or if a
    /// variable-length payload's embedded length is not strictly less than
    /// the schema width.
    pub fn get_tag_value(
        &self,
        table: &Table,
        col_id: ColId,
        ty: ColType,
        bytes: u32,
    ) -> Result<Option<TagVal>> {
        let tags = table
            .tags()
            .ok_or(MetaError::InvalidAction("only child tables carry tag values"))?;
        let tag_schema = self
            .get_tag_schema(table)
            .ok_or(MetaError::InvalidAction("table belongs to no tag schema"))?;
        let col = tag_schema
            .col(col_id)
            .ok_or(MetaError::InvalidAction("no such tag column"))?;
        if col.ty != ty || col.bytes != bytes {
            return Err(MetaError::InvalidAction(
                "tag column type or width disagrees with the schema",
            ));
        }

        let Some(val) = tags.read().get(col_id).cloned() else {
            return Ok(None);
        };
        if col.ty.is_var_len() && val.payload_len() >= col.bytes {
            return Err(MetaError::InvalidAction(
                "tag value length exceeds the schema width",
            ));
        }
        Ok(Some(val))
    }

    fn super_of(&self, table: &Table) -> Result<Arc<Table>> {
        let uid = table
            .super_uid()
            .ok_or(MetaError::InvalidAction("table belongs to no super table"))?;
        self.get_by_uid(uid).ok_or_else(|| MetaError::no_table(uid))
    }

    /// Creates the table described by `cfg` and registers it.
    ///
    /// A child whose super is absent synthesizes the super from the same
    /// cfg and registers it first; a child whose super exists applies the
    /// cfg to it as an update (which may raise the tag schema or append a
    /// schema version). Action records are emitted super-first.
    pub fn create_table(&self, cfg: &TableCfg) -> Result<Arc<Table>> {
        cfg.validate()?;
        let mut inner = self.inner.write();

        if inner.uid_map.contains_key(&cfg.uid()) {
            return Err(MetaError::TableAlreadyExists(cfg.uid()));
        }

        let mut new_super = None;
        if cfg.kind() == CfgKind::Child {
            let super_uid = cfg.super_uid.expect("validated: child cfg has a super uid");
            match inner.uid_map.get(&super_uid).cloned() {
                None => new_super = Some(Arc::new(Table::new(cfg, true)?)),
                Some(sup) => {
                    if !sup.is_super() {
                        return Err(MetaError::InvalidTableType {
                            uid: super_uid,
                            expected: "super",
                            actual: sup.kind_name(),
                        });
                    }
                    Self::update_table_locked(&mut inner, &sup, cfg)?;
                }
            }
        }

        let table = Arc::new(Table::new(cfg, false)?);

        // Encode the records up front so an unencodable table fails the
        // create without touching the registry.
        let super_payload = match &new_super {
            Some(sup) => Some(encode_payload(sup)?),
            None => None,
        };
        let table_payload = encode_payload(&table)?;

        if let Some(sup) = &new_super {
            inner.add_to_meta(sup.clone(), false)?;
        }
        if let Err(err) = inner.add_to_meta(table.clone(), true) {
            // The synthesized super was never logged; unwind it.
            if let Some(sup) = &new_super {
                inner.remove_from_meta(sup, false);
            }
            return Err(err);
        }

        if let (Some(sup), Some(payload)) = (&new_super, super_payload) {
            inner.actions.push(ActionRecord::update(sup.uid().0, payload));
        }
        inner
            .actions
            .push(ActionRecord::update(table.uid().0, table_payload));

        log::debug!(
            "created {} table {} (uid {}, tid {})",
            table.kind_name(),
            table.name(),
            table.uid(),
            table.tid()
        );
        Ok(table)
    }

    /// Drops the table with uid `uid`.
    ///
    /// Dropping a super table drops its whole family, children first, with
    /// a drop record emitted for every member. Dropping a stream table
    /// notifies the continuous-query subsystem before anything else.
    pub fn drop_table(&self, uid: TableUid) -> Result<()> {
        let table = self.get_by_uid(uid).ok_or_else(|| MetaError::no_table(uid))?;
        if let Some(sql) = table.sql() {
            // The hook runs while the registry lock is not held.
            self.hooks.on_stream_drop(uid, sql);
        }
        drop(table);

        let mut inner = self.inner.write();
        let table = inner
            .uid_map
            .get(&uid)
            .cloned()
            .ok_or_else(|| MetaError::no_table(uid))?;

        if let Some(index) = table.index() {
            let child_uids = index.read().uids().collect_vec();
            for child_uid in child_uids {
                let Some(child) = inner.uid_map.get(&child_uid).cloned() else {
                    continue;
                };
                inner.push_drop(child_uid);
                // The whole index dies with the super; no per-child unlink.
                inner.remove_from_meta(&child, false);
            }
        }

        inner.remove_from_meta(&table, true);
        inner.push_drop(uid);

        log::debug!("dropped {} table {} (uid {})", table.kind_name(), table.name(), uid);
        Ok(())
    }

    /// Applies `cfg` to a non-child table: a strictly newer tag schema
    /// replaces a super's wholesale, and a strictly newer column schema is
    /// appended to the history. Returns whether anything changed.
    pub fn update_table(&self, uid: TableUid, cfg: &TableCfg) -> Result<bool> {
        let mut inner = self.inner.write();
        let table = inner
            .uid_map
            .get(&uid)
            .cloned()
            .ok_or_else(|| MetaError::no_table(uid))?;
        Self::update_table_locked(&mut inner, &table, cfg)
    }

    fn update_table_locked(inner: &mut MetaInner, table: &Arc<Table>, cfg: &TableCfg) -> Result<bool> {
        if table.is_child() {
            return Err(MetaError::InvalidTableType {
                uid: table.uid(),
                expected: "non-child",
                actual: table.kind_name(),
            });
        }
        let mut changed = false;

        if let (Some(lock), Some(new_tags)) = (table.tag_schema(), cfg.tag_schema.as_ref()) {
            let mut tag_schema = lock.write();
            if new_tags.version() > tag_schema.version() {
                *tag_schema = new_tags.clone();
                changed = true;
            }
        }

        if let (Some(lock), Some(new_schema)) = (table.schemas(), cfg.schema.as_ref()) {
            let mut schemas = lock.write();
            if schemas.latest().version() < new_schema.version() {
                schemas.push(new_schema.clone());
                inner.max_cols = inner.max_cols.max(new_schema.num_cols());
                inner.max_row_bytes = inner.max_row_bytes.max(new_schema.row_bytes());
                changed = true;
            }
        }

        if changed {
            inner.push_update(table)?;
            log::trace!("updated table {} (uid {})", table.name(), table.uid());
        }
        Ok(changed)
    }

    /// Applies a tag-value update to a child table.
    ///
    /// A message carrying a newer tag-schema version than ours triggers a
    /// configuration refresh through the host callback; one carrying an
    /// older version is rejected with
    /// [`MetaError::TagVersionOutOfDate`]. An update to the designated
    /// tag column re-keys the child in its super's index.
    pub fn update_tag_value(&self, msg: &UpdateTagValMsg) -> Result<()> {
        let bad_id = || MetaError::InvalidTableId {
            uid: msg.uid,
            tid: msg.tid,
        };

        // Refresh a stale tag schema before taking the write lock: the
        // configuration callback may block on the host.
        {
            let child = self.get_by_uid(msg.uid).ok_or_else(bad_id)?;
            if child.tid() != msg.tid {
                return Err(bad_id());
            }
            if !child.is_child() {
                return Err(MetaError::InvalidAction(
                    "tag values can only be updated on child tables",
                ));
            }
            let sup = self.super_of(&child)?;
            let local = sup
                .tag_schema()
                .expect("super tables own a tag schema")
                .read()
                .version();
            if local < msg.tver {
                let bytes = self
                    .hooks
                    .table_config(self.opts.shard_id, child.tid())?
                    .ok_or(MetaError::InvalidAction(
                        "tag schema out of date and the host offers no configuration",
                    ))?;
                let cfg = CreateTableMsg::decode(&bytes)?.into_cfg();
                self.update_table(sup.uid(), &cfg)?;
            }
        }

        let mut inner = self.inner.write();
        let child = inner.uid_map.get(&msg.uid).cloned().ok_or_else(bad_id)?;
        if child.tid() != msg.tid || !child.is_child() {
            return Err(bad_id());
        }
        let sup = {
            let super_uid = child.super_uid().expect("children store their super's uid");
            inner
                .uid_map
                .get(&super_uid)
                .cloned()
                .ok_or_else(|| MetaError::no_table(super_uid))?
        };
        let tag_schema = sup
            .tag_schema()
            .expect("super tables own a tag schema")
            .read()
            .clone();

        if tag_schema.version() > msg.tver {
            return Err(MetaError::TagVersionOutOfDate {
                local: tag_schema.version(),
                incoming: msg.tver,
            });
        }
        if tag_schema.version() < msg.tver {
            return Err(MetaError::InvalidAction(
                "tag schema still out of date after reconfiguration",
            ));
        }

        let col = tag_schema
            .col(msg.col_id)
            .ok_or(MetaError::InvalidAction("no such tag column"))?;
        if col.ty != msg.ty || col.bytes != msg.bytes {
            return Err(MetaError::InvalidAction(
                "tag column type or width disagrees with the schema",
            ));
        }
        if col.ty.is_var_len() && msg.value.payload_len() >= col.bytes {
            return Err(MetaError::InvalidAction(
                "tag value length exceeds the schema width",
            ));
        }
        if msg.value.payload_len() > u16::MAX as u32 {
            return Err(MetaError::InvalidAction("tag value is too long to encode"));
        }

        let tags = child.tags().expect("child tables own a tag row");
        let designated = tag_schema.cols()[0].col_id;
        if msg.col_id == designated {
            // Re-key the index around the in-place mutation.
            inner.remove_from_index(&child);
            tags.write().set(msg.col_id, msg.value.clone());
            inner.add_to_index(&child)?;
        } else {
            tags.write().set(msg.col_id, msg.value.clone());
        }
        inner.push_update(&child)?;

        log::trace!(
            "updated tag col {} of table {} (uid {})",
            msg.col_id,
            child.name(),
            msg.uid
        );
        Ok(())
    }

    /// Number of tables occupying tid slots.
    pub fn n_tables(&self) -> u32 {
        self.inner.read().n_tables
    }

    /// Number of registered super tables.
    pub fn super_count(&self) -> usize {
        self.inner.read().super_list.len()
    }

    /// Upper bound on the column count of any non-child table.
    pub fn max_cols(&self) -> u32 {
        self.inner.read().max_cols
    }

    /// Upper bound on the row width of any non-child table.
    pub fn max_row_bytes(&self) -> u32 {
        self.inner.read().max_row_bytes
    }

    /// Number of action records awaiting the next commit.
    pub fn pending_actions(&self) -> usize {
        self.inner.read().actions.len()
    }
}

impl MetaInner {
    /// Registers `table` in every container it belongs to.
    ///
    /// The checks run before any container is touched, so a failure leaves
    /// the registry unchanged. `register_index` is false during restore,
    /// where the super may not have been replayed yet.
    pub(crate) fn add_to_meta(&mut self, table: Arc<Table>, register_index: bool) -> Result<()> {
        let uid = table.uid();
        if self.uid_map.contains_key(&uid) {
            return Err(MetaError::TableAlreadyExists(uid));
        }

        if table.is_super() {
            self.super_list.push(table.clone());
        } else {
            let tid = table.tid();
            if tid.is_none() || tid.0 == 0 || tid.idx() >= self.tables.len() {
                return Err(MetaError::InvalidCreateMessage(format!(
                    "tid {tid} out of range"
                )));
            }
            if self.tables[tid.idx()].is_some() {
                return Err(MetaError::InvalidCreateMessage(format!(
                    "tid {tid} is already occupied"
                )));
            }
            if table.is_child() && register_index {
                self.add_to_index(&table)?;
            }
            self.tables[tid.idx()] = Some(table.clone());
            self.n_tables += 1;
        }

        self.uid_map.insert(uid, table.clone());

        if !table.is_child() {
            if let Some((cols, row_bytes)) = table.schema_dims() {
                self.max_cols = self.max_cols.max(cols);
                self.max_row_bytes = self.max_row_bytes.max(row_bytes);
            }
        }
        Ok(())
    }

    /// Unregisters `table` and releases the registry's use of it.
    ///
    /// `remove_from_index` is false when the caller is tearing the whole
    /// index down anyway (family drop) or no index exists yet (restore).
    pub(crate) fn remove_from_meta(&mut self, table: &Arc<Table>, remove_from_index: bool) {
        if table.is_super() {
            // Supers are few; a backward linear scan is fine.
            if let Some(pos) = self.super_list.iter().rposition(|s| Arc::ptr_eq(s, table)) {
                self.super_list.remove(pos);
            }
        } else {
            if let Some(slot) = self.tables.get_mut(table.tid().idx()) {
                *slot = None;
            }
            if table.is_child() && remove_from_index {
                self.remove_from_index(table);
            }
            self.n_tables -= 1;
        }

        self.uid_map.remove(&table.uid());

        if !table.is_child() {
            if let Some((cols, row_bytes)) = table.schema_dims() {
                // Stale over-estimation is tolerated when neither maximum
                // was tied by the removed table.
                if cols == self.max_cols || row_bytes == self.max_row_bytes {
                    self.recompute_maxima();
                }
            }
        }

        table.release();
    }

    /// Links `child` into its super's tag index under the child's current
    /// designated-tag-column value.
    pub(crate) fn add_to_index(&mut self, child: &Arc<Table>) -> Result<()> {
        let super_uid = child.super_uid().expect("add_to_index takes a child");
        let sup = self
            .uid_map
            .get(&super_uid)
            .cloned()
            .ok_or_else(|| MetaError::no_table(super_uid))?;
        if !sup.is_super() {
            return Err(MetaError::InvalidTableType {
                uid: super_uid,
                expected: "super",
                actual: sup.kind_name(),
            });
        }

        let designated = sup
            .tag_schema()
            .expect("super tables own a tag schema")
            .read()
            .cols()[0]
            .col_id;
        let key = child.tag_key(designated);
        sup.index()
            .expect("super tables own an index")
            .write()
            .insert(key, child.uid());
        Ok(())
    }

    /// Unlinks `child` from its super's tag index, disambiguating among
    /// equal keys by table identity.
    pub(crate) fn remove_from_index(&mut self, child: &Arc<Table>) {
        let Some(super_uid) = child.super_uid() else {
            return;
        };
        let Some(sup) = self.uid_map.get(&super_uid) else {
            return;
        };
        let (Some(tag_schema), Some(index)) = (sup.tag_schema(), sup.index()) else {
            return;
        };
        let designated = tag_schema.read().cols()[0].col_id;
        let key = child.tag_key(designated);
        index.write().remove(&key, child.uid());
    }

    fn recompute_maxima(&mut self) {
        let mut max_cols = 0;
        let mut max_row_bytes = 0;
        let non_children = self
            .tables
            .iter()
            .flatten()
            .filter(|t| !t.is_child())
            .chain(self.super_list.iter());
        for table in non_children {
            if let Some((cols, row_bytes)) = table.schema_dims() {
                max_cols = max_cols.max(cols);
                max_row_bytes = max_row_bytes.max(row_bytes);
            }
        }
        self.max_cols = max_cols;
        self.max_row_bytes = max_row_bytes;
    }

    pub(crate) fn push_update(&mut self, table: &Table) -> Result<()> {
        let payload = encode_payload(table)?;
        self.actions.push(ActionRecord::update(table.uid().0, payload));
        Ok(())
    }

    pub(crate) fn push_drop(&mut self, uid: TableUid) {
        self.actions.push(ActionRecord::drop(uid.0));
    }

    /// Empties every container; used by close.
    pub(crate) fn clear(&mut self) {
        for slot in self.tables.iter_mut() {
            *slot = None;
        }
        self.super_list.clear();
        self.uid_map.clear();
        self.n_tables = 0;
        self.max_cols = 0;
        self.max_row_bytes = 0;
    }
}

/// A table serialized as an action-record payload.
fn encode_payload(table: &Table) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    table.encode(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use pretty_assertions::assert_eq;
    use tsrepo_actionlog::ActionKind;

    use super::*;
    use crate::name::TableName;
    use crate::schema::{ColumnSchema, MAX_SCHEMAS_PER_TABLE};
    use crate::tagrow::TagRow;

    fn name(s: &str) -> TableName {
        TableName::from_str(s).unwrap()
    }

    fn data_schema(version: i32) -> Schema {
        Schema::new(
            version,
            vec![
                ColumnSchema::fixed(1u16, ColType::Timestamp),
                ColumnSchema::fixed(2u16, ColType::Int),
            ],
        )
    }

    fn tag_schema(version: i32) -> Schema {
        Schema::new(version, vec![ColumnSchema::fixed(10u16, ColType::Int)])
    }

    /// The literal configuration of the implicit-super-creation scenario.
    fn child_cfg() -> TableCfg {
        TableCfg::new(CfgKind::Child, TableUid(1001), TableTid(5))
            .name(name("c"))
            .schema(data_schema(1))
            .tag_schema(tag_schema(1))
            .super_name(name("s"))
            .super_uid(TableUid(77))
            .tag_values([(ColId(10), TagVal::Int(42))].into_iter().collect())
    }

    fn tag_update(tver: i32, value: i32) -> UpdateTagValMsg {
        UpdateTagValMsg {
            uid: TableUid(1001),
            tid: TableTid(5),
            tver,
            col_id: ColId(10),
            ty: ColType::Int,
            bytes: 4,
            value: TagVal::Int(value),
        }
    }

    fn meta() -> Meta {
        Meta::new(Options::default(), Arc::new(NoHooks))
    }

    fn actions(meta: &Meta) -> Vec<(ActionKind, u64)> {
        meta.inner
            .read()
            .actions
            .iter()
            .map(|r| (r.act, r.uid))
            .collect()
    }

    fn index_uids(meta: &Meta, super_uid: TableUid, key: TagVal) -> Vec<TableUid> {
        let sup = meta.get_by_uid(super_uid).unwrap();
        let index = sup.index().unwrap().read();
        index.seek(&key).collect()
    }

    #[test]
    fn implicit_super_creation() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();

        let sup = meta.get_by_uid(TableUid(77)).expect("super registered");
        let child = meta.get_by_uid(TableUid(1001)).expect("child registered");
        assert!(sup.is_super());
        assert!(child.is_child());
        assert_eq!(meta.super_count(), 1);
        assert_eq!(meta.n_tables(), 1);
        assert!(Arc::ptr_eq(&meta.get_by_tid(TableTid(5)).unwrap(), &child));

        assert_eq!(sup.index().unwrap().read().len(), 1);
        assert_eq!(
            index_uids(&meta, TableUid(77), TagVal::Int(42)),
            [TableUid(1001)]
        );

        // Two update records, the super's first.
        assert_eq!(
            actions(&meta),
            [(ActionKind::UpdateMeta, 77), (ActionKind::UpdateMeta, 1001)]
        );
    }

    #[test]
    fn duplicate_uid_rejected() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();

        let err = meta.create_table(&child_cfg()).unwrap_err();
        assert!(matches!(err, MetaError::TableAlreadyExists(TableUid(1001))));

        // State unchanged.
        assert_eq!(meta.n_tables(), 1);
        assert_eq!(meta.super_count(), 1);
        assert_eq!(meta.pending_actions(), 2);
        assert_eq!(meta.get_by_uid(TableUid(77)).unwrap().index().unwrap().read().len(), 1);
    }

    #[test]
    fn tag_value_update_moves_index_key() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();

        meta.update_tag_value(&tag_update(1, 99)).unwrap();

        assert!(index_uids(&meta, TableUid(77), TagVal::Int(42)).is_empty());
        assert_eq!(
            index_uids(&meta, TableUid(77), TagVal::Int(99)),
            [TableUid(1001)]
        );
        let child = meta.get_by_uid(TableUid(1001)).unwrap();
        assert_eq!(
            meta.get_tag_value(&child, ColId(10), ColType::Int, 4).unwrap(),
            Some(TagVal::Int(99))
        );
        // The mutation is logged so it survives a restart.
        assert_eq!(actions(&meta).last(), Some(&(ActionKind::UpdateMeta, 1001)));
    }

    #[test]
    fn schema_fifo_eviction() {
        let meta = meta();
        let uid = TableUid(5);
        meta.create_table(
            &TableCfg::new(CfgKind::Normal, uid, TableTid(1))
                .name(name("n"))
                .schema(data_schema(1)),
        )
        .unwrap();

        for version in 2..=(MAX_SCHEMAS_PER_TABLE as i32 + 1) {
            let changed = meta
                .update_table(
                    uid,
                    &TableCfg::new(CfgKind::Normal, uid, TableTid(1)).schema(data_schema(version)),
                )
                .unwrap();
            assert!(changed);
        }

        let table = meta.get_by_uid(uid).unwrap();
        let schemas = table.schemas().unwrap().read();
        assert_eq!(schemas.len(), MAX_SCHEMAS_PER_TABLE);
        assert_eq!(schemas.iter().next().unwrap().version(), 2);
        assert_eq!(schemas.latest().version(), MAX_SCHEMAS_PER_TABLE as i32 + 1);
        drop(schemas);
        assert_eq!(meta.get_schema_by_version(&table, 1).unwrap(), None);
    }

    #[test]
    fn stale_schema_version_ignored() {
        let meta = meta();
        let uid = TableUid(5);
        meta.create_table(
            &TableCfg::new(CfgKind::Normal, uid, TableTid(1))
                .name(name("n"))
                .schema(data_schema(4)),
        )
        .unwrap();

        let changed = meta
            .update_table(
                uid,
                &TableCfg::new(CfgKind::Normal, uid, TableTid(1)).schema(data_schema(4)),
            )
            .unwrap();
        assert!(!changed);
        assert_eq!(meta.pending_actions(), 1);
    }

    #[test]
    fn stale_tag_schema_rejected() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();

        // Raise the super's tag schema to v3.
        meta.update_table(
            TableUid(77),
            &TableCfg::new(CfgKind::Normal, TableUid(77), TableTid::NONE).tag_schema(tag_schema(3)),
        )
        .unwrap();

        let err = meta.update_tag_value(&tag_update(2, 99)).unwrap_err();
        assert!(matches!(
            err,
            MetaError::TagVersionOutOfDate { local: 3, incoming: 2 }
        ));

        // Child state unchanged.
        let child = meta.get_by_uid(TableUid(1001)).unwrap();
        assert_eq!(
            meta.get_tag_value(&child, ColId(10), ColType::Int, 4).unwrap(),
            Some(TagVal::Int(42))
        );
        assert_eq!(
            index_uids(&meta, TableUid(77), TagVal::Int(42)),
            [TableUid(1001)]
        );
    }

    #[test]
    fn newer_tag_version_refreshes_config() {
        /// Host double that serves one canned create-table message.
        struct ConfigSource(Vec<u8>);

        impl MetaHooks for ConfigSource {
            fn table_config(&self, _shard: u32, _tid: TableTid) -> Result<Option<Vec<u8>>> {
                Ok(Some(self.0.clone()))
            }
        }

        let refreshed = CreateTableMsg {
            kind: CfgKind::Child,
            uid: TableUid(1001),
            tid: TableTid(5),
            super_uid: TableUid(77),
            sversion: 1,
            tversion: 2,
            name: name("c"),
            super_name: Some(name("s")),
            columns: data_schema(1).cols().to_vec(),
            tags: tag_schema(2).cols().to_vec(),
            tag_values: TagRow::new(),
            sql: None,
        };

        let meta = Meta::new(
            Options::default(),
            Arc::new(ConfigSource(refreshed.encode().unwrap())),
        );
        meta.create_table(&child_cfg()).unwrap();

        meta.update_tag_value(&tag_update(2, 99)).unwrap();

        let sup = meta.get_by_uid(TableUid(77)).unwrap();
        assert_eq!(sup.tag_schema().unwrap().read().version(), 2);
        assert_eq!(
            index_uids(&meta, TableUid(77), TagVal::Int(99)),
            [TableUid(1001)]
        );
    }

    #[test]
    fn drop_super_drops_family() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();
        let second = TableCfg::new(CfgKind::Child, TableUid(1002), TableTid(6))
            .name(name("c2"))
            .schema(data_schema(1))
            .tag_schema(tag_schema(1))
            .super_name(name("s"))
            .super_uid(TableUid(77))
            .tag_values([(ColId(10), TagVal::Int(42))].into_iter().collect());
        meta.create_table(&second).unwrap();
        assert_eq!(meta.n_tables(), 2);

        meta.drop_table(TableUid(77)).unwrap();

        assert!(meta.get_by_uid(TableUid(77)).is_none());
        assert!(meta.get_by_uid(TableUid(1001)).is_none());
        assert!(meta.get_by_uid(TableUid(1002)).is_none());
        assert!(meta.get_by_tid(TableTid(5)).is_none());
        assert!(meta.get_by_tid(TableTid(6)).is_none());
        assert_eq!(meta.n_tables(), 0);
        assert_eq!(meta.super_count(), 0);

        // Children-first drop records, the super's last.
        let drops = actions(&meta)
            .into_iter()
            .filter(|(act, _)| *act == ActionKind::DropMeta)
            .map(|(_, uid)| uid)
            .collect_vec();
        assert_eq!(drops.len(), 3);
        assert_eq!(drops[2], 77);
        assert!(drops[..2].iter().copied().sorted().eq([1001, 1002]));
    }

    #[test]
    fn drop_stream_invokes_cq_hook() {
        #[derive(Default)]
        struct DropSpy(StdMutex<Vec<(TableUid, String)>>);

        impl MetaHooks for DropSpy {
            fn on_stream_drop(&self, uid: TableUid, sql: &str) {
                self.0.lock().unwrap().push((uid, sql.to_owned()));
            }
        }

        let spy = Arc::new(DropSpy::default());
        let meta = Meta::new(Options::default(), spy.clone());
        meta.create_table(
            &TableCfg::new(CfgKind::Stream, TableUid(8), TableTid(2))
                .name(name("st"))
                .schema(data_schema(1))
                .sql("select avg(v) from n interval(1m)"),
        )
        .unwrap();

        meta.drop_table(TableUid(8)).unwrap();
        assert_eq!(
            *spy.0.lock().unwrap(),
            [(TableUid(8), "select avg(v) from n interval(1m)".to_owned())]
        );
        assert!(meta.get_by_uid(TableUid(8)).is_none());
    }

    #[test]
    fn maxima_cover_non_child_tables() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();
        assert_eq!(meta.max_cols(), 2);
        assert_eq!(meta.max_row_bytes(), 12);

        let wide = Schema::new(
            1,
            vec![
                ColumnSchema::fixed(1u16, ColType::Timestamp),
                ColumnSchema::fixed(2u16, ColType::Int),
                ColumnSchema::var(3u16, ColType::Binary, 64),
            ],
        );
        meta.create_table(
            &TableCfg::new(CfgKind::Normal, TableUid(5), TableTid(1))
                .name(name("wide"))
                .schema(wide),
        )
        .unwrap();
        assert_eq!(meta.max_cols(), 3);
        assert_eq!(meta.max_row_bytes(), 76);

        // Removing the table that held both maxima triggers a rescan, which
        // must also cover the super list.
        meta.drop_table(TableUid(5)).unwrap();
        assert_eq!(meta.max_cols(), 2);
        assert_eq!(meta.max_row_bytes(), 12);
    }

    #[test]
    fn index_size_matches_family_size() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();
        for i in 0..4u64 {
            let cfg = TableCfg::new(CfgKind::Child, TableUid(2000 + i), TableTid(10 + i as u32))
                .name(name(&format!("c{i}")))
                .schema(data_schema(1))
                .tag_schema(tag_schema(1))
                .super_name(name("s"))
                .super_uid(TableUid(77))
                .tag_values([(ColId(10), TagVal::Int(42))].into_iter().collect());
            meta.create_table(&cfg).unwrap();
        }
        meta.drop_table(TableUid(2001)).unwrap();

        let sup = meta.get_by_uid(TableUid(77)).unwrap();
        let inner = meta.inner.read();
        let family = inner
            .tables
            .iter()
            .flatten()
            .filter(|t| t.super_uid() == Some(TableUid(77)))
            .count();
        assert_eq!(sup.index().unwrap().read().len(), family);
        assert_eq!(family, 4);
    }

    #[test]
    fn get_tag_value_checks_type_and_width() {
        let meta = meta();
        meta.create_table(&child_cfg()).unwrap();
        let child = meta.get_by_uid(TableUid(1001)).unwrap();

        assert!(matches!(
            meta.get_tag_value(&child, ColId(10), ColType::BigInt, 8),
            Err(MetaError::InvalidAction(_))
        ));
        assert!(matches!(
            meta.get_tag_value(&child, ColId(10), ColType::Int, 8),
            Err(MetaError::InvalidAction(_))
        ));
        assert_eq!(
            meta.get_tag_value(&child, ColId(10), ColType::Int, 4).unwrap(),
            Some(TagVal::Int(42))
        );
    }
}

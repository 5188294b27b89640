//! Transaction snapshots.
//!
//! `begin` records the identity and generation of every existing table. The
//! first mutation of a recorded table inside the transaction deep-copies it
//! into the snapshot before the change is applied; later mutations do not
//! copy again. Tables created inside the transaction are simply absent from
//! the snapshot.
//!
//! Nested `begin` pushes a child snapshot linked to its parent. Rolling back a
//! child restores the state at the child's `begin`; committing a child hands
//! its saved copies to the parent so an outer rollback still sees them.

use crate::database::table_key;
use crate::table::{Table, TableId};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use strata_core::{Error, Result};
use tracing::{debug, info};

/// Global transaction ID counter.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID type.
pub type TransactionId = u64;

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction has run yet.
    #[default]
    Idle,
    /// A transaction is in progress.
    Active,
    /// The last outermost transaction committed.
    Committed,
    /// The last outermost transaction rolled back.
    RolledBack,
}

#[derive(Debug)]
struct SnapshotEntry {
    id: TableId,
    name: String,
    generation: u64,
    saved: Option<Table>,
}

/// The recorded state of one (possibly nested) transaction.
#[derive(Debug)]
pub struct Snapshot {
    id: TransactionId,
    entries: Vec<SnapshotEntry>,
    parent: Option<Box<Snapshot>>,
}

impl Snapshot {
    fn capture<'a>(tables: impl IntoIterator<Item = &'a Table>, parent: Option<Box<Snapshot>>) -> Self {
        Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::SeqCst),
            entries: tables
                .into_iter()
                .map(|t| SnapshotEntry {
                    id: t.id(),
                    name: String::from(t.name()),
                    generation: t.generation(),
                    saved: None,
                })
                .collect(),
            parent,
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Generation recorded at `begin` for table `id`.
    pub fn recorded_generation(&self, id: TableId) -> Option<u64> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.generation)
    }

    /// Returns true if table `id` existed when the snapshot was taken.
    pub fn contains(&self, id: TableId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Returns true if table `id` has been copied into this snapshot.
    pub fn is_saved(&self, id: TableId) -> bool {
        self.entries.iter().any(|e| e.id == id && e.saved.is_some())
    }

    /// Number of tables copied so far.
    pub fn saved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.saved.is_some()).count()
    }

    /// Rebuilds the table map as it was when this snapshot was taken.
    ///
    /// Saved copies replace the live tables (under their original names),
    /// untouched tables are kept, and tables created afterwards are dropped.
    /// A restored table gets a generation above any it held before so that
    /// caches built against the discarded state can never validate.
    pub fn restore(self, current: BTreeMap<String, Table>) -> BTreeMap<String, Table> {
        let mut live: BTreeMap<TableId, Table> = current.into_values().map(|t| (t.id(), t)).collect();
        let mut out = BTreeMap::new();
        for entry in self.entries {
            let current = live.remove(&entry.id);
            let table = match entry.saved {
                Some(mut saved) => {
                    let floor = current.as_ref().map_or(saved.generation(), |t| t.generation());
                    saved.advance_generation_past(floor);
                    saved
                }
                None => match current {
                    Some(t) => t,
                    None => continue,
                },
            };
            debug_assert!(table.name().eq_ignore_ascii_case(&entry.name));
            out.insert(table_key(&entry.name), table);
        }
        for table in live.values() {
            debug!(table = table.name(), "discarding table created in rolled back transaction");
        }
        out
    }

    fn merge_into_parent(self) -> Option<Box<Snapshot>> {
        let mut parent = self.parent?;
        for entry in self.entries {
            let Some(saved) = entry.saved else { continue };
            if let Some(slot) = parent.entries.iter_mut().find(|e| e.id == entry.id) {
                if slot.saved.is_none() {
                    slot.saved = Some(saved);
                }
            }
        }
        Some(parent)
    }
}

/// Stack of active snapshots.
#[derive(Debug, Default)]
pub struct TransactionManager {
    current: Option<Box<Snapshot>>,
    state: TransactionState,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if a transaction is in progress.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Nesting depth (0 when idle).
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.current.as_deref();
        while let Some(s) = node {
            depth += 1;
            node = s.parent.as_deref();
        }
        depth
    }

    /// Innermost snapshot.
    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_deref()
    }

    /// Starts a (possibly nested) transaction over the given tables.
    pub fn begin<'a>(&mut self, tables: impl IntoIterator<Item = &'a Table>) -> TransactionId {
        let parent = self.current.take();
        let snapshot = Snapshot::capture(tables, parent);
        let id = snapshot.id;
        self.current = Some(Box::new(snapshot));
        self.state = TransactionState::Active;
        info!(transaction = id, depth = self.depth(), "begin");
        id
    }

    /// Copies `table` into the innermost snapshot unless already saved.
    ///
    /// Returns true when a copy was taken.
    pub fn protect(&mut self, table: &Table) -> bool {
        let Some(snapshot) = self.current.as_deref_mut() else {
            return false;
        };
        match snapshot.entries.iter_mut().find(|e| e.id == table.id()) {
            Some(entry) if entry.saved.is_none() => {
                debug!(transaction = snapshot.id, table = table.name(), "copy-on-write save");
                entry.saved = Some(table.clone());
                true
            }
            _ => false,
        }
    }

    /// Commits the innermost transaction. Returns the remaining depth.
    pub fn commit(&mut self) -> Result<usize> {
        let snapshot = self.current.take().ok_or(Error::NoActiveTransaction)?;
        let id = snapshot.id;
        self.current = snapshot.merge_into_parent();
        let depth = self.depth();
        if depth == 0 {
            self.state = TransactionState::Committed;
        }
        info!(transaction = id, depth, "commit");
        Ok(depth)
    }

    /// Pops the innermost snapshot for the caller to restore.
    pub fn rollback(&mut self) -> Result<Snapshot> {
        let mut snapshot = self.current.take().ok_or(Error::NoActiveTransaction)?;
        self.current = snapshot.parent.take();
        if self.current.is_none() {
            self.state = TransactionState::RolledBack;
        }
        info!(transaction = snapshot.id, depth = self.depth(), saved = snapshot.saved_count(), "rollback");
        Ok(*snapshot)
    }
}

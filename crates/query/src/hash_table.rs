//! Block hash table.
//!
//! A chained hash index over rows that live elsewhere (usually a
//! [`FlatColumns`] buffer): a power-of-two bucket array holding the newest
//! entry of each chain, a parallel `next` array linking older entries, and the
//! full hash of every entry so that most mismatches are rejected without
//! touching the key columns.
//!
//! Entry ids are dense and equal to insertion order, so entry `i` is row `i`
//! of the buffer the caller appended alongside.

use alloc::vec;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hasher};
use hashbrown::hash_map::DefaultHashBuilder;
use strata_core::block::{ColumnBlock, FlatColumns};

const EMPTY: u32 = u32::MAX;
const MIN_BUCKETS: usize = 16;

/// Chained hash index addressed by row id.
#[derive(Clone, Debug)]
pub struct BlockHashTable {
    buckets: Vec<u32>,
    next: Vec<u32>,
    hashes: Vec<u64>,
    mask: usize,
    sealed: bool,
}

impl BlockHashTable {
    /// Creates a table whose bucket array is the next power of two above `expected`.
    pub fn with_capacity(expected: usize) -> Self {
        let buckets = (expected + 1).next_power_of_two().max(MIN_BUCKETS);
        Self {
            buckets: vec![EMPTY; buckets],
            next: Vec::with_capacity(expected),
            hashes: Vec::with_capacity(expected),
            mask: buckets - 1,
            sealed: false,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Adds an entry and returns its row id.
    pub fn insert(&mut self, hash: u64) -> u32 {
        debug_assert!(!self.sealed, "insert into a sealed hash table");
        if self.hashes.len() >= self.buckets.len() {
            self.grow();
        }
        let row = self.hashes.len() as u32;
        let bucket = hash as usize & self.mask;
        self.hashes.push(hash);
        self.next.push(self.buckets[bucket]);
        self.buckets[bucket] = row;
        row
    }

    /// Marks the build phase as finished. Later inserts are a logic error.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Iterates the entries whose stored hash equals `hash`.
    pub fn probe(&self, hash: u64) -> Probe<'_> {
        Probe {
            table: self,
            hash,
            cursor: self.buckets[hash as usize & self.mask],
        }
    }

    /// First entry with `hash` for which `eq` holds.
    pub fn find<F>(&self, hash: u64, mut eq: F) -> Option<u32>
    where
        F: FnMut(u32) -> bool,
    {
        self.probe(hash).find(|&row| eq(row))
    }

    /// Hash stored for entry `row`.
    #[inline]
    pub fn hash_of(&self, row: u32) -> u64 {
        self.hashes[row as usize]
    }

    fn grow(&mut self) {
        let buckets = self.buckets.len() * 2;
        self.buckets.clear();
        self.buckets.resize(buckets, EMPTY);
        self.mask = buckets - 1;
        for (row, &hash) in self.hashes.iter().enumerate() {
            let bucket = hash as usize & self.mask;
            self.next[row] = self.buckets[bucket];
            self.buckets[bucket] = row as u32;
        }
    }
}

/// Iterator over the candidate entries of one hash.
pub struct Probe<'a> {
    table: &'a BlockHashTable,
    hash: u64,
    cursor: u32,
}

impl Iterator for Probe<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.cursor != EMPTY {
            let row = self.cursor;
            self.cursor = self.table.next[row as usize];
            if self.table.hashes[row as usize] == self.hash {
                return Some(row);
            }
        }
        None
    }
}

/// Hash function shared by the build and probe side of one operator.
#[derive(Clone, Default)]
pub struct KeyHasher {
    state: DefaultHashBuilder,
}

impl KeyHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes the entries at `pos` of `columns`.
    pub fn hash_row<'a, I>(&self, columns: I, pos: usize) -> u64
    where
        I: IntoIterator<Item = &'a ColumnBlock>,
    {
        let mut h = self.state.build_hasher();
        for column in columns {
            column.hash_at(pos, &mut h);
        }
        h.finish()
    }
}

/// Returns true if any of `columns` is null at `pos`.
#[inline]
pub fn any_null<'a, I>(columns: I, pos: usize) -> bool
where
    I: IntoIterator<Item = &'a ColumnBlock>,
{
    columns.into_iter().any(|c| c.is_null(pos))
}

/// Key equality between row `pos` of `probe` and row `row` of `build`; nulls never match.
#[inline]
pub fn keys_equal(probe: &[&ColumnBlock], pos: usize, build: &FlatColumns, row: u32) -> bool {
    probe
        .iter()
        .enumerate()
        .all(|(c, col)| col.eq_at(pos, build.column(c), row as usize))
}

/// Grouping equality between row `pos` of `probe` and row `row` of `build`; nulls match nulls.
#[inline]
pub fn keys_same(probe: &[&ColumnBlock], pos: usize, build: &FlatColumns, row: u32) -> bool {
    probe
        .iter()
        .enumerate()
        .all(|(c, col)| col.same_at(pos, build.column(c), row as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{DataType, Value};

    #[test]
    fn test_sizing() {
        assert_eq!(BlockHashTable::with_capacity(0).bucket_count(), 16);
        assert_eq!(BlockHashTable::with_capacity(100).bucket_count(), 128);
        assert_eq!(BlockHashTable::with_capacity(128).bucket_count(), 256);
    }

    #[test]
    fn test_chain_collisions() {
        let mut table = BlockHashTable::with_capacity(4);
        // same bucket, different hashes
        let a = table.insert(1);
        let b = table.insert(1 + 16);
        let c = table.insert(1);
        let hits: Vec<u32> = table.probe(1).collect();
        assert_eq!(hits, vec![c, a]);
        assert_eq!(table.probe(17).collect::<Vec<_>>(), vec![b]);
        assert_eq!(table.probe(2).count(), 0);
    }

    #[test]
    fn test_grow_keeps_entries() {
        let mut table = BlockHashTable::with_capacity(0);
        for h in 0..1000u64 {
            table.insert(h * 7919);
        }
        assert!(table.bucket_count() >= 1000);
        for h in 0..1000u64 {
            assert_eq!(table.probe(h * 7919).next(), Some(h as u32));
        }
        table.seal();
        assert!(table.is_sealed());
    }

    #[test]
    fn test_key_hash_and_equality() {
        let hasher = KeyHasher::new();
        let mut build = FlatColumns::new(&[DataType::Int64]);
        let mut table = BlockHashTable::with_capacity(3);
        for v in [Value::Int64(1), Value::Null, Value::Int64(3)] {
            build.append_values(&[v]).unwrap();
            let row = build.len() - 1;
            table.insert(hasher.hash_row(build.columns(), row));
        }
        let probe = ColumnBlock::from_values(DataType::Int32, &[Value::Int32(3), Value::Null]).unwrap();
        let cols = [&probe];
        let h = hasher.hash_row(cols, 0);
        assert_eq!(table.find(h, |r| keys_equal(&cols, 0, &build, r)), Some(2));
        let h = hasher.hash_row(cols, 1);
        assert!(any_null(cols, 1));
        assert_eq!(table.find(h, |r| keys_equal(&cols, 1, &build, r)), None);
        assert_eq!(table.find(h, |r| keys_same(&cols, 1, &build, r)), Some(1));
    }
}

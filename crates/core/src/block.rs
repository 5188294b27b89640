//! Columnar data representation.
//!
//! A [`ColumnBlock`] is one typed column: a validity bitmap plus a payload
//! vector matching its type tag. Text payloads are `(offset, length)` spans
//! into a per-column text heap. Operators exchange [`RowBlock`]s of at most
//! [`BLOCK_CAPACITY`] rows; a row block shares its columns through `Rc` and may
//! carry a [`SelectionVector`] restricting which positions are visible, so a
//! filter narrows the selection instead of copying data.
//!
//! [`FlatColumns`] is the unbounded variant used by operators that must buffer
//! their whole input (sort, hash build, window, materialization).

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::{compare_f64, Value};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

/// Maximum number of rows in one row block.
pub const BLOCK_CAPACITY: usize = 1024;

/// One bit per row; a set bit means the row holds a value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Creates an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bitmap with room for `bits` entries.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            len: 0,
        }
    }

    /// Appends one bit.
    #[inline]
    pub fn push(&mut self, bit: bool) {
        let word = self.len / 64;
        if word == self.words.len() {
            self.words.push(0);
        }
        if bit {
            self.words[word] |= 1u64 << (self.len % 64);
        }
        self.len += 1;
    }

    /// Returns bit `i`.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    /// Overwrites bit `i`.
    #[inline]
    pub fn set(&mut self, i: usize, bit: bool) {
        debug_assert!(i < self.len);
        if bit {
            self.words[i / 64] |= 1u64 << (i % 64);
        } else {
            self.words[i / 64] &= !(1u64 << (i % 64));
        }
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the bitmap has no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Variable-width text payload: spans into a shared heap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextColumn {
    spans: Vec<(u32, u32)>,
    heap: String,
}

impl TextColumn {
    /// Appends a string.
    #[inline]
    pub fn push(&mut self, s: &str) {
        let offset = self.heap.len() as u32;
        self.heap.push_str(s);
        self.spans.push((offset, s.len() as u32));
    }

    /// Returns the string at `i`.
    #[inline]
    pub fn get(&self, i: usize) -> &str {
        let (offset, len) = self.spans[i];
        &self.heap[offset as usize..(offset + len) as usize]
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn with_capacity(rows: usize) -> Self {
        Self {
            spans: Vec::with_capacity(rows),
            heap: String::new(),
        }
    }
}

/// Typed payload of a column block.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Text(TextColumn),
    Date(Vec<i32>),
    Timestamp(Vec<i64>),
}

impl ColumnData {
    fn with_capacity(data_type: DataType, rows: usize) -> Self {
        match data_type {
            DataType::Boolean => ColumnData::Boolean(Vec::with_capacity(rows)),
            DataType::Int32 => ColumnData::Int32(Vec::with_capacity(rows)),
            DataType::Int64 => ColumnData::Int64(Vec::with_capacity(rows)),
            DataType::Float64 => ColumnData::Float64(Vec::with_capacity(rows)),
            DataType::Text => ColumnData::Text(TextColumn::with_capacity(rows)),
            DataType::Date => ColumnData::Date(Vec::with_capacity(rows)),
            DataType::Timestamp => ColumnData::Timestamp(Vec::with_capacity(rows)),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnData::Boolean(_) => DataType::Boolean,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Text(_) => DataType::Text,
            ColumnData::Date(_) => DataType::Date,
            ColumnData::Timestamp(_) => DataType::Timestamp,
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Int32(v) | ColumnData::Date(v) => v.len(),
            ColumnData::Int64(v) | ColumnData::Timestamp(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    fn push_default(&mut self) {
        match self {
            ColumnData::Boolean(v) => v.push(false),
            ColumnData::Int32(v) | ColumnData::Date(v) => v.push(0),
            ColumnData::Int64(v) | ColumnData::Timestamp(v) => v.push(0),
            ColumnData::Float64(v) => v.push(0.0),
            ColumnData::Text(v) => v.push(""),
        }
    }

    /// Copies entry `i` of `src` (same variant) onto the end of `self`.
    fn push_from(&mut self, src: &ColumnData, i: usize) {
        match (self, src) {
            (ColumnData::Boolean(d), ColumnData::Boolean(s)) => d.push(s[i]),
            (ColumnData::Int32(d), ColumnData::Int32(s)) => d.push(s[i]),
            (ColumnData::Int64(d), ColumnData::Int64(s)) => d.push(s[i]),
            (ColumnData::Float64(d), ColumnData::Float64(s)) => d.push(s[i]),
            (ColumnData::Text(d), ColumnData::Text(s)) => d.push(s.get(i)),
            (ColumnData::Date(d), ColumnData::Date(s)) => d.push(s[i]),
            (ColumnData::Timestamp(d), ColumnData::Timestamp(s)) => d.push(s[i]),
            (d, _) => d.push_default(),
        }
    }
}

/// A typed column with a validity bitmap.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnBlock {
    validity: Bitmap,
    data: ColumnData,
}

impl ColumnBlock {
    /// Creates an empty column of the given type.
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    /// Creates an empty column with room for `rows` entries.
    pub fn with_capacity(data_type: DataType, rows: usize) -> Self {
        Self {
            validity: Bitmap::with_capacity(rows),
            data: ColumnData::with_capacity(data_type, rows),
        }
    }

    /// Creates a column of `rows` nulls.
    pub fn nulls(data_type: DataType, rows: usize) -> Self {
        let mut block = Self::with_capacity(data_type, rows);
        for _ in 0..rows {
            block.push_null();
        }
        block
    }

    /// Builds a column from values, casting each to `data_type`.
    pub fn from_values(data_type: DataType, values: &[Value]) -> Result<Self> {
        let mut block = Self::with_capacity(data_type, values.len());
        for v in values {
            block.push(v)?;
        }
        Ok(block)
    }

    /// The column's type tag.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Raw typed payload.
    #[inline]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Validity bitmap.
    #[inline]
    pub fn validity(&self) -> &Bitmap {
        &self.validity
    }

    /// Number of entries (including nulls).
    #[inline]
    pub fn len(&self) -> usize {
        self.validity.len()
    }

    /// Returns true if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    /// Returns true if entry `i` is null.
    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        !self.validity.get(i)
    }

    /// Number of null entries.
    pub fn null_count(&self) -> usize {
        self.len() - self.validity.count_ones()
    }

    /// Appends a null entry.
    #[inline]
    pub fn push_null(&mut self) {
        self.data.push_default();
        self.validity.push(false);
    }

    /// Appends a value, casting it to the column type when needed.
    pub fn push(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        match (&mut self.data, value) {
            (ColumnData::Boolean(d), Value::Boolean(v)) => d.push(*v),
            (ColumnData::Int32(d), Value::Int32(v)) => d.push(*v),
            (ColumnData::Int64(d), Value::Int64(v)) => d.push(*v),
            (ColumnData::Int64(d), Value::Int32(v)) => d.push(*v as i64),
            (ColumnData::Float64(d), Value::Float64(v)) => d.push(*v),
            (ColumnData::Text(d), Value::Text(v)) => d.push(v),
            (ColumnData::Date(d), Value::Date(v)) => d.push(*v),
            (ColumnData::Timestamp(d), Value::Timestamp(v)) => d.push(*v),
            (data, other) => {
                let target = data.data_type();
                let cast = other.cast_to(target)?;
                if cast.data_type() != Some(target) {
                    return Err(Error::internal("cast produced wrong type"));
                }
                return self.push(&cast);
            }
        }
        self.validity.push(true);
        Ok(())
    }

    /// Returns entry `i` as an owned value.
    pub fn value(&self, i: usize) -> Value {
        if self.is_null(i) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Boolean(v) => Value::Boolean(v[i]),
            ColumnData::Int32(v) => Value::Int32(v[i]),
            ColumnData::Int64(v) => Value::Int64(v[i]),
            ColumnData::Float64(v) => Value::Float64(v[i]),
            ColumnData::Text(v) => Value::Text(String::from(v.get(i))),
            ColumnData::Date(v) => Value::Date(v[i]),
            ColumnData::Timestamp(v) => Value::Timestamp(v[i]),
        }
    }

    /// Appends entry `i` of `src`, casting when the types differ.
    pub fn push_from(&mut self, src: &ColumnBlock, i: usize) -> Result<()> {
        if src.is_null(i) {
            self.push_null();
        } else if src.data_type() == self.data_type() {
            self.data.push_from(&src.data, i);
            self.validity.push(true);
        } else {
            self.push(&src.value(i))?;
        }
        Ok(())
    }

    /// Appends the entries of `src` at `positions`.
    pub fn extend_from<I>(&mut self, src: &ColumnBlock, positions: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        for i in positions {
            self.push_from(src, i)?;
        }
        Ok(())
    }

    /// Builds a new column holding the entries at `indices`, in order.
    pub fn gather(&self, indices: &[u32]) -> ColumnBlock {
        let mut out = ColumnBlock::with_capacity(self.data_type(), indices.len());
        for &i in indices {
            let i = i as usize;
            out.data.push_from(&self.data, i);
            out.validity.push(self.validity.get(i));
        }
        out
    }

    /// Like [`gather`](Self::gather), with `None` producing a null.
    pub fn gather_optional(&self, indices: &[Option<u32>]) -> ColumnBlock {
        let mut out = ColumnBlock::with_capacity(self.data_type(), indices.len());
        for idx in indices {
            match idx {
                Some(i) => {
                    let i = *i as usize;
                    out.data.push_from(&self.data, i);
                    out.validity.push(self.validity.get(i));
                }
                None => out.push_null(),
            }
        }
        out
    }

    /// Copies the contiguous range `[start, start + len)`.
    pub fn slice(&self, start: usize, len: usize) -> ColumnBlock {
        let end = (start + len).min(self.len());
        let mut out = ColumnBlock::with_capacity(self.data_type(), end.saturating_sub(start));
        for i in start..end {
            out.data.push_from(&self.data, i);
            out.validity.push(self.validity.get(i));
        }
        out
    }

    /// Converts every entry to `target`.
    pub fn cast(&self, target: DataType) -> Result<ColumnBlock> {
        if target == self.data_type() {
            return Ok(self.clone());
        }
        let mut out = ColumnBlock::with_capacity(target, self.len());
        for i in 0..self.len() {
            out.push(&self.value(i))?;
        }
        Ok(out)
    }

    /// Compares two non-null entries.
    ///
    /// Mixed numeric widths compare by value; otherwise mismatched types fall
    /// back to the total order on [`Value`].
    pub fn compare_at(&self, i: usize, other: &ColumnBlock, j: usize) -> Ordering {
        match (&self.data, &other.data) {
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a[i].cmp(&b[j]),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a[i].cmp(&b[j]),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => compare_f64(a[i], b[j]),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.get(i).cmp(b.get(j)),
            (ColumnData::Date(a), ColumnData::Date(b)) => a[i].cmp(&b[j]),
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a[i].cmp(&b[j]),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => a[i].cmp(&b[j]),
            _ => self.value(i).cmp(&other.value(j)),
        }
    }

    /// Key equality of two entries; a null never equals anything.
    pub fn eq_at(&self, i: usize, other: &ColumnBlock, j: usize) -> bool {
        if self.is_null(i) || other.is_null(j) {
            return false;
        }
        match (&self.data, &other.data) {
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a[i] == b[j],
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a[i] == b[j],
            (ColumnData::Text(a), ColumnData::Text(b)) => a.get(i) == b.get(j),
            _ => self.value(i).sql_eq(&other.value(j)) == Some(true),
        }
    }

    /// Grouping equality: like [`eq_at`](Self::eq_at) but two nulls are equal.
    pub fn same_at(&self, i: usize, other: &ColumnBlock, j: usize) -> bool {
        match (self.is_null(i), other.is_null(j)) {
            (true, true) => true,
            (false, false) => self.eq_at(i, other, j) || self.float_nan_pair(i, other, j),
            _ => false,
        }
    }

    fn float_nan_pair(&self, i: usize, other: &ColumnBlock, j: usize) -> bool {
        match (&self.data, &other.data) {
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a[i].is_nan() && b[j].is_nan(),
            _ => false,
        }
    }

    /// Feeds entry `i` into `state`.
    ///
    /// Integral numbers hash identically regardless of width (and so do floats
    /// holding an integral value) so that keys of different numeric types that
    /// compare equal also hash equal.
    pub fn hash_at<H: Hasher>(&self, i: usize, state: &mut H) {
        if self.is_null(i) {
            0xffu8.hash(state);
            return;
        }
        match &self.data {
            ColumnData::Boolean(v) => v[i].hash(state),
            ColumnData::Int32(v) => (v[i] as i64).hash(state),
            ColumnData::Int64(v) => v[i].hash(state),
            ColumnData::Float64(v) => {
                let f = v[i];
                let t = libm::trunc(f);
                if t == f && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                    (t as i64).hash(state)
                } else if f.is_nan() {
                    f64::NAN.to_bits().hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            ColumnData::Text(v) => v.get(i).hash(state),
            ColumnData::Date(v) => v[i].hash(state),
            ColumnData::Timestamp(v) => v[i].hash(state),
        }
    }
}

/// Ordered, ascending list of visible row positions within a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionVector(Vec<u32>);

impl SelectionVector {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates an empty selection with capacity.
    pub fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    /// Wraps positions that are already sorted ascending.
    pub fn from_sorted(positions: Vec<u32>) -> Self {
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        Self(positions)
    }

    /// Selects every position in `0..len`.
    pub fn all(len: usize) -> Self {
        Self((0..len as u32).collect())
    }

    /// Appends a position greater than every position already present.
    #[inline]
    pub fn push(&mut self, position: u32) {
        debug_assert!(self.0.last().map_or(true, |&l| l < position));
        self.0.push(position);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|&p| p as usize)
    }

    /// Positions present in both selections.
    pub fn intersect(&self, other: &SelectionVector) -> SelectionVector {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len().min(b.len()));
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        SelectionVector(out)
    }

    /// Positions present in either selection.
    pub fn union(&self, other: &SelectionVector) -> SelectionVector {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        SelectionVector(out)
    }

    /// Positions of `self` not present in `other`.
    pub fn difference(&self, other: &SelectionVector) -> SelectionVector {
        let b = &other.0;
        let mut j = 0;
        let mut out = Vec::with_capacity(self.0.len());
        for &p in &self.0 {
            while j < b.len() && b[j] < p {
                j += 1;
            }
            if j >= b.len() || b[j] != p {
                out.push(p);
            }
        }
        SelectionVector(out)
    }

    /// Drops the first `n` positions.
    pub fn skip(&self, n: usize) -> SelectionVector {
        SelectionVector(self.0.iter().skip(n).copied().collect())
    }

    /// Keeps only the first `n` positions.
    pub fn truncate(&mut self, n: usize) {
        self.0.truncate(n);
    }
}

/// Iterator over the visible positions of a [`RowBlock`].
pub enum Positions<'a> {
    All(core::ops::Range<usize>),
    Selected(core::slice::Iter<'a, u32>),
}

impl Iterator for Positions<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            Positions::All(r) => r.next(),
            Positions::Selected(it) => it.next().map(|&p| p as usize),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Positions::All(r) => r.size_hint(),
            Positions::Selected(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for Positions<'_> {}

/// A horizontal view over shared column blocks plus an optional selection.
#[derive(Clone, Debug)]
pub struct RowBlock {
    columns: Vec<Rc<ColumnBlock>>,
    len: usize,
    selection: Option<Rc<SelectionVector>>,
}

impl RowBlock {
    /// Creates a block over shared columns; all columns must have `len` rows.
    pub fn new(columns: Vec<Rc<ColumnBlock>>, len: usize) -> Self {
        debug_assert!(len <= BLOCK_CAPACITY);
        debug_assert!(columns.iter().all(|c| c.len() == len));
        Self {
            columns,
            len,
            selection: None,
        }
    }

    /// Creates a block taking ownership of freshly built columns.
    pub fn from_columns(columns: Vec<ColumnBlock>, len: usize) -> Self {
        Self::new(columns.into_iter().map(Rc::new).collect(), len)
    }

    /// Returns this block restricted to `selection`.
    pub fn with_selection(mut self, selection: SelectionVector) -> Self {
        self.selection = Some(Rc::new(selection));
        self
    }

    /// Returns this block with its selection removed or replaced.
    pub fn with_selection_opt(mut self, selection: Option<Rc<SelectionVector>>) -> Self {
        self.selection = selection;
        self
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of physical rows, ignoring the selection.
    #[inline]
    pub fn physical_len(&self) -> usize {
        self.len
    }

    /// Number of visible rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        match &self.selection {
            Some(sel) => sel.len(),
            None => self.len,
        }
    }

    /// Returns true if no rows are visible.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    #[inline]
    pub fn column(&self, i: usize) -> &ColumnBlock {
        &self.columns[i]
    }

    /// Shared handle to column `i`.
    #[inline]
    pub fn column_rc(&self, i: usize) -> Rc<ColumnBlock> {
        Rc::clone(&self.columns[i])
    }

    #[inline]
    pub fn columns(&self) -> &[Rc<ColumnBlock>] {
        &self.columns
    }

    #[inline]
    pub fn selection(&self) -> Option<&SelectionVector> {
        self.selection.as_deref()
    }

    /// Shared handle to the selection.
    pub fn selection_rc(&self) -> Option<Rc<SelectionVector>> {
        self.selection.clone()
    }

    /// Visible physical positions, in order.
    pub fn positions(&self) -> Positions<'_> {
        match &self.selection {
            Some(sel) => Positions::Selected(sel.as_slice().iter()),
            None => Positions::All(0..self.len),
        }
    }

    /// Value at column `col`, physical position `pos`.
    #[inline]
    pub fn value(&self, col: usize, pos: usize) -> Value {
        self.columns[col].value(pos)
    }

    /// All values of the row at physical position `pos`.
    pub fn row_values(&self, pos: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(pos)).collect()
    }

    /// Physically applies the selection, producing a dense block.
    pub fn compact(&self) -> RowBlock {
        match &self.selection {
            None => self.clone(),
            Some(sel) => {
                let columns = self
                    .columns
                    .iter()
                    .map(|c| Rc::new(c.gather(sel.as_slice())))
                    .collect();
                RowBlock::new(columns, sel.len())
            }
        }
    }

    /// Keeps a subset of the columns in the given order; shares the column data.
    pub fn project(&self, columns: &[usize]) -> RowBlock {
        RowBlock {
            columns: columns.iter().map(|&c| Rc::clone(&self.columns[c])).collect(),
            len: self.len,
            selection: self.selection.clone(),
        }
    }
}

/// Unbounded columnar buffer for operators that materialize their input.
#[derive(Clone, Debug)]
pub struct FlatColumns {
    columns: Vec<ColumnBlock>,
    len: usize,
}

impl FlatColumns {
    /// Creates an empty buffer for the given column types.
    pub fn new(types: &[DataType]) -> Self {
        Self {
            columns: types.iter().map(|&t| ColumnBlock::new(t)).collect(),
            len: 0,
        }
    }

    /// Number of buffered rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, i: usize) -> &ColumnBlock {
        &self.columns[i]
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnBlock] {
        &self.columns
    }

    /// Column types in order.
    pub fn types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type()).collect()
    }

    /// Appends every visible row of `block`.
    pub fn append_block(&mut self, block: &RowBlock) -> Result<()> {
        if block.width() != self.columns.len() {
            return Err(Error::internal("block width does not match buffer"));
        }
        for (dst, src) in self.columns.iter_mut().zip(block.columns()) {
            dst.extend_from(src, block.positions())?;
        }
        self.len += block.row_count();
        Ok(())
    }

    /// Appends one row of physical position `pos` in `block`.
    pub fn append_position(&mut self, block: &RowBlock, pos: usize) -> Result<()> {
        for (dst, src) in self.columns.iter_mut().zip(block.columns()) {
            dst.push_from(src, pos)?;
        }
        self.len += 1;
        Ok(())
    }

    /// Appends one row of values.
    pub fn append_values(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::internal("row width does not match buffer"));
        }
        for (dst, v) in self.columns.iter_mut().zip(values) {
            dst.push(v)?;
        }
        self.len += 1;
        Ok(())
    }

    /// Value at `(col, row)`.
    #[inline]
    pub fn value(&self, col: usize, row: usize) -> Value {
        self.columns[col].value(row)
    }

    /// All values of row `row`.
    pub fn row_values(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    /// Builds a row block of the rows at `indices` (at most one block's worth).
    pub fn gather_block(&self, indices: &[u32]) -> RowBlock {
        let columns = self.columns.iter().map(|c| c.gather(indices)).collect();
        RowBlock::from_columns(columns, indices.len())
    }

    /// Builds a row block of rows `[start, start + len)`.
    pub fn slice_block(&self, start: usize, len: usize) -> RowBlock {
        let len = len.min(self.len.saturating_sub(start));
        let columns = self.columns.iter().map(|c| c.slice(start, len)).collect();
        RowBlock::from_columns(columns, len)
    }

    /// Moves the buffered columns out.
    pub fn into_columns(self) -> Vec<ColumnBlock> {
        self.columns
    }

    /// Removes all rows, keeping the column types.
    pub fn clear(&mut self) {
        let types = self.types();
        *self = FlatColumns::new(&types);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn int_block(values: &[Option<i32>]) -> ColumnBlock {
        let mut b = ColumnBlock::new(DataType::Int32);
        for v in values {
            b.push(&Value::from(*v)).unwrap();
        }
        b
    }

    #[test]
    fn test_bitmap() {
        let mut bm = Bitmap::new();
        for i in 0..130 {
            bm.push(i % 3 == 0);
        }
        assert_eq!(bm.len(), 130);
        assert!(bm.get(0));
        assert!(!bm.get(1));
        assert!(bm.get(129));
        bm.set(1, true);
        assert!(bm.get(1));
        assert_eq!(bm.count_ones(), 45);
    }

    #[test]
    fn test_column_push_and_value() {
        let b = int_block(&[Some(1), None, Some(3)]);
        assert_eq!(b.len(), 3);
        assert_eq!(b.null_count(), 1);
        assert_eq!(b.value(0), Value::Int32(1));
        assert_eq!(b.value(1), Value::Null);
        assert!(b.is_null(1));
    }

    #[test]
    fn test_push_casts() {
        let mut b = ColumnBlock::new(DataType::Int64);
        b.push(&Value::Int32(5)).unwrap();
        b.push(&Value::Text("6".into())).unwrap();
        assert_eq!(b.value(1), Value::Int64(6));
        assert!(b.push(&Value::Text("x".into())).is_err());
    }

    #[test]
    fn test_text_column() {
        let mut b = ColumnBlock::new(DataType::Text);
        b.push(&Value::from("alpha")).unwrap();
        b.push_null();
        b.push(&Value::from("")).unwrap();
        b.push(&Value::from("beta")).unwrap();
        assert_eq!(b.value(0), Value::from("alpha"));
        assert_eq!(b.value(2), Value::from(""));
        assert_eq!(b.value(3), Value::from("beta"));
        let g = b.gather(&[3, 1]);
        assert_eq!(g.value(0), Value::from("beta"));
        assert!(g.is_null(1));
    }

    #[test]
    fn test_gather_optional_and_slice() {
        let b = int_block(&[Some(10), Some(20), Some(30)]);
        let g = b.gather_optional(&[Some(2), None, Some(0)]);
        assert_eq!(g.value(0), Value::Int32(30));
        assert!(g.is_null(1));
        let s = b.slice(1, 5);
        assert_eq!(s.len(), 2);
        assert_eq!(s.value(0), Value::Int32(20));
    }

    #[test]
    fn test_eq_and_same() {
        let a = int_block(&[Some(1), None]);
        let mut b = ColumnBlock::new(DataType::Int64);
        b.push(&Value::Int64(1)).unwrap();
        b.push_null();
        assert!(a.eq_at(0, &b, 0));
        assert!(!a.eq_at(1, &b, 1));
        assert!(a.same_at(1, &b, 1));
    }

    #[test]
    fn test_hash_consistent_across_widths() {
        use core::hash::BuildHasher;
        let hasher = fnv_builder();
        let a = int_block(&[Some(42)]);
        let mut b = ColumnBlock::new(DataType::Float64);
        b.push(&Value::Float64(42.0)).unwrap();
        let mut ha = hasher.build_hasher();
        a.hash_at(0, &mut ha);
        let mut hb = hasher.build_hasher();
        b.hash_at(0, &mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[derive(Default)]
    struct Fnv(u64);
    impl Hasher for Fnv {
        fn finish(&self) -> u64 {
            self.0
        }
        fn write(&mut self, bytes: &[u8]) {
            for b in bytes {
                self.0 ^= *b as u64;
                self.0 = self.0.wrapping_mul(0x100000001b3);
            }
        }
    }
    fn fnv_builder() -> core::hash::BuildHasherDefault<Fnv> {
        core::hash::BuildHasherDefault::default()
    }

    #[test]
    fn test_selection_set_ops() {
        let a = SelectionVector::from_sorted(vec![1, 3, 5, 7]);
        let b = SelectionVector::from_sorted(vec![3, 4, 7, 9]);
        assert_eq!(a.intersect(&b).as_slice(), &[3, 7]);
        assert_eq!(a.union(&b).as_slice(), &[1, 3, 4, 5, 7, 9]);
        assert_eq!(a.difference(&b).as_slice(), &[1, 5]);
        assert_eq!(a.skip(3).as_slice(), &[7]);
    }

    #[test]
    fn test_row_block_selection() {
        let block = RowBlock::from_columns(vec![int_block(&[Some(1), Some(2), Some(3)])], 3);
        assert_eq!(block.row_count(), 3);
        let filtered = block.with_selection(SelectionVector::from_sorted(vec![0, 2]));
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(filtered.positions().collect::<Vec<_>>(), vec![0, 2]);
        let dense = filtered.compact();
        assert!(dense.selection().is_none());
        assert_eq!(dense.value(0, 1), Value::Int32(3));
    }

    #[test]
    fn test_flat_columns() {
        let block = RowBlock::from_columns(vec![int_block(&[Some(1), Some(2), Some(3)])], 3)
            .with_selection(SelectionVector::from_sorted(vec![1, 2]));
        let mut flat = FlatColumns::new(&[DataType::Int32]);
        flat.append_block(&block).unwrap();
        flat.append_values(&[Value::Int32(9)]).unwrap();
        assert_eq!(flat.len(), 3);
        let out = flat.gather_block(&[2, 0]);
        assert_eq!(out.value(0, 0), Value::Int32(9));
        assert_eq!(out.value(0, 1), Value::Int32(2));
        assert_eq!(flat.slice_block(1, 10).row_count(), 2);
    }
}

//! Scalar and (supplemented) string property storage.
//!
//! Each vertex/edge carries a fixed number of scalar property "columns"
//! (`VERTEX_PROPERTY_NUM`/`EDGE_PROPERTY_NUM` in spec.md §6). A column is a
//! single reference-counted vector indexed by the same position as the
//! owning neighborhood element (clustered-segment offset, range-tree
//! element offset, or ART leaf slot). Mutating one property only
//! copy-on-writes its own column, per §4.3.6: "Multi-property maps retain
//! shared sub-vectors; only the modified sub-vector is copied."
//!
//! String properties are a supplemented, optional feature (see
//! `SPEC_FULL.md`): a small number of named, reference-counted string
//! columns alongside the scalar ones, sharing the same copy-on-write
//! discipline.

use crate::pool::PropertyPool;
use crate::sync::Arc;

/// A scalar property value. Absence is represented out-of-band (`None` in
/// getters); the engine never stores a sentinel in a populated column.
pub type PropertyValue = u64;

/// One scalar property column, shared by reference until mutated.
pub type PropertyColumn = Arc<Vec<Option<PropertyValue>>>;

/// One string property column.
pub type StringColumn = Arc<Vec<Option<Arc<str>>>>;

/// A set of scalar (+ optional string) property columns for either the
/// vertex table or one neighborhood structure. Fresh all-`None` columns are
/// drawn from a `PropertyPool`; a column whose last `Arc` reference drops
/// here returns its buffer to that same pool.
#[derive(Clone)]
pub struct PropertyMap {
    scalar: Vec<PropertyColumn>,
    strings: Vec<StringColumn>,
    scalar_pool: Arc<PropertyPool<Option<PropertyValue>>>,
    string_pool: Arc<PropertyPool<Option<Arc<str>>>>,
}

impl PropertyMap {
    /// Builds an empty property map sized for `len` elements per column.
    #[must_use]
    pub fn new(scalar_columns: usize, string_columns: usize, len: usize) -> Self {
        let scalar_pool = Arc::new(PropertyPool::new());
        let string_pool = Arc::new(PropertyPool::new());
        Self {
            scalar: (0..scalar_columns)
                .map(|_| Arc::new(fresh_column(&scalar_pool, len)))
                .collect(),
            strings: (0..string_columns)
                .map(|_| Arc::new(fresh_column(&string_pool, len)))
                .collect(),
            scalar_pool,
            string_pool,
        }
    }

    /// Number of scalar columns.
    #[must_use]
    pub fn scalar_columns(&self) -> usize {
        self.scalar.len()
    }

    /// Gets a scalar property value at `idx` for `property_id`.
    #[must_use]
    pub fn get(&self, idx: usize, property_id: usize) -> Option<PropertyValue> {
        self.scalar.get(property_id)?.get(idx).copied().flatten()
    }

    /// Gets several scalar properties at `idx` in one pass, sharing the
    /// column lookups (the multi-key read path from `SPEC_FULL.md`).
    #[must_use]
    pub fn get_many(&self, idx: usize, property_ids: &[usize]) -> Vec<Option<PropertyValue>> {
        property_ids.iter().map(|&pid| self.get(idx, pid)).collect()
    }

    /// Gets a string property value at `idx` for `property_id`.
    #[must_use]
    pub fn get_string(&self, idx: usize, property_id: usize) -> Option<Arc<str>> {
        self.strings.get(property_id)?.get(idx).cloned().flatten()
    }

    /// Copy-on-writes a single scalar column, setting `idx` to `value`.
    /// Returns the detached predecessor column for the caller's
    /// retired-resources list.
    #[must_use]
    #[track_caller]
    pub fn set(&mut self, idx: usize, property_id: usize, value: PropertyValue) -> PropertyColumn {
        let old = self.scalar[property_id].clone();
        let mut new_col = (*old).clone();
        new_col[idx] = Some(value);
        self.scalar[property_id] = Arc::new(new_col);
        old
    }

    /// Copy-on-writes a single string column, setting `idx` to `value`.
    #[must_use]
    #[track_caller]
    pub fn set_string(&mut self, idx: usize, property_id: usize, value: Arc<str>) -> StringColumn {
        let old = self.strings[property_id].clone();
        let mut new_col = (*old).clone();
        new_col[idx] = Some(value);
        self.strings[property_id] = Arc::new(new_col);
        old
    }

    /// Clears the entry at `idx` across every column (used when a vertex or
    /// edge slot is retired, e.g. after `remove_vertex`).
    pub fn clear_entry(&mut self, idx: usize) -> (Vec<PropertyColumn>, Vec<StringColumn>) {
        let mut retired_scalar = Vec::with_capacity(self.scalar.len());
        for col in &mut self.scalar {
            if col[idx].is_some() {
                let old = col.clone();
                let mut new_col = (**col).clone();
                new_col[idx] = None;
                *col = Arc::new(new_col);
                retired_scalar.push(old);
            }
        }
        let mut retired_strings = Vec::with_capacity(self.strings.len());
        for col in &mut self.strings {
            if col[idx].is_some() {
                let old = col.clone();
                let mut new_col = (**col).clone();
                new_col[idx] = None;
                *col = Arc::new(new_col);
                retired_strings.push(old);
            }
        }
        (retired_scalar, retired_strings)
    }

    /// Grows every column to at least `len` entries, in place (used when a
    /// neighborhood segment grows and needs a parallel property slot).
    pub fn grow_to(&mut self, len: usize) {
        for col in &mut self.scalar {
            if col.len() < len {
                let mut new_col = (**col).clone();
                new_col.resize(len, None);
                *col = Arc::new(new_col);
            }
        }
        for col in &mut self.strings {
            if col.len() < len {
                let mut new_col = (**col).clone();
                new_col.resize(len, None);
                *col = Arc::new(new_col);
            }
        }
    }
}

/// Acquires a pooled buffer and fills it with `len` `None` entries.
fn fresh_column<T>(pool: &PropertyPool<Option<T>>, len: usize) -> Vec<Option<T>> {
    let mut buf = pool.acquire(len);
    buf.resize(len, None);
    buf
}

impl Drop for PropertyMap {
    fn drop(&mut self) {
        for col in self.scalar.drain(..) {
            if let Ok(v) = Arc::try_unwrap(col) {
                self.scalar_pool.release(v);
            }
        }
        for col in self.strings.drain(..) {
            if let Ok(v) = Arc::try_unwrap(col) {
                self.string_pool.release(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_only_copies_touched_column() {
        let mut map = PropertyMap::new(2, 0, 4);
        let col0_before = map.scalar[0].clone();
        let col1_before = map.scalar[1].clone();

        let _old = map.set(1, 0, 42);

        assert!(Arc::ptr_eq(&col1_before, &map.scalar[1]));
        assert!(!Arc::ptr_eq(&col0_before, &map.scalar[0]));
        assert_eq!(map.get(1, 0), Some(42));
        assert_eq!(map.get(0, 0), None);
    }

    #[test]
    fn string_properties_round_trip() {
        let mut map = PropertyMap::new(0, 1, 2);
        let name: Arc<str> = Arc::from("alice");
        map.set_string(0, 0, name.clone());
        assert_eq!(map.get_string(0, 0).as_deref(), Some("alice"));
        assert_eq!(map.get_string(1, 0), None);
    }

    #[test]
    fn clear_entry_detaches_all_touched_columns() {
        let mut map = PropertyMap::new(2, 1, 2);
        map.set(0, 0, 1);
        map.set(0, 1, 2);
        map.set_string(0, 0, Arc::from("x"));
        let (scalars, strings) = map.clear_entry(0);
        assert_eq!(scalars.len(), 2);
        assert_eq!(strings.len(), 1);
        assert_eq!(map.get(0, 0), None);
        assert_eq!(map.get_string(0, 0), None);
    }
}

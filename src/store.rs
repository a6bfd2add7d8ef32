//! Backing-store collaborator contract.
//!
//! cryptcell does not implement a wide-column store; it consumes one through
//! the narrow [`ColumnStore`] trait. The trait models the subset of a
//! sparse wide-column store the proxy relies on: row-keyed cells addressed by
//! family/qualifier/timestamp, unsigned lexicographic row ordering, and
//! server-side family / qualifier-prefix / time-range filtering.
//!
//! [`MemoryStore`] is an in-process implementation with the same ordering
//! guarantees, used by the test suite and as a default collaborator. A real
//! deployment substitutes a network client behind the same trait.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use crate::error::{CryptcellError, Result};

/// A half-open timestamp interval `[min, max)`, the store-native range form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl TimeRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// The unbounded range: matches every timestamp.
    pub fn all() -> Self {
        Self {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    /// The single-instant range containing exactly `ts`.
    pub fn at(ts: i64) -> Self {
        Self {
            min: ts,
            max: ts.saturating_add(1),
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.min <= ts && ts < self.max
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all()
    }
}

/// A stored cell under some row: the four non-row components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

/// One row of a scan result, cells in native comparator order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub row: Vec<u8>,
    pub cells: Vec<StoredCell>,
}

/// A fully-qualified cell coordinate, used to address deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRef {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
}

/// Server-side cell filtering for get and scan.
///
/// Empty `families` / `qualifier_prefixes` mean "no restriction". A cell
/// passes the prefix filter when its qualifier starts with any of the
/// prefixes. `key_only` strips values, returning coordinates only.
#[derive(Debug, Clone, Default)]
pub struct CellFilter {
    pub families: Vec<Vec<u8>>,
    pub qualifier_prefixes: Vec<Vec<u8>>,
    pub time_range: TimeRange,
    pub key_only: bool,
}

impl CellFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(mut self, family: Vec<u8>) -> Self {
        self.families.push(family);
        self
    }

    pub fn qualifier_prefix(mut self, prefix: Vec<u8>) -> Self {
        self.qualifier_prefixes.push(prefix);
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = range;
        self
    }

    pub fn key_only(mut self) -> Self {
        self.key_only = true;
        self
    }

    fn matches(&self, cell: &StoredCell) -> bool {
        if !self.families.is_empty() && !self.families.iter().any(|f| *f == cell.family) {
            return false;
        }
        if !self.qualifier_prefixes.is_empty()
            && !self
                .qualifier_prefixes
                .iter()
                .any(|p| cell.qualifier.starts_with(p))
        {
            return false;
        }
        self.time_range.contains(cell.timestamp)
    }
}

/// The backing-store contract consumed by bucketizers and proxies.
///
/// Row ordering is unsigned lexicographic byte comparison; scan results and
/// the cells within a row are returned in native comparator order (family
/// ascending, qualifier ascending, timestamp descending). Implementations
/// report their own failures through `CryptcellError::Store`; this layer
/// never retries.
pub trait ColumnStore {
    /// Create a table with the given families. No-op when it already exists.
    fn create_table(&self, table: &str, families: &[Vec<u8>]) -> Result<()>;

    /// Drop a table. No-op when absent.
    fn delete_table(&self, table: &str) -> Result<()>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Write all `cells` under `row`. Single-row atomicity only.
    fn put(&self, table: &str, row: &[u8], cells: &[StoredCell]) -> Result<()>;

    /// Return the cells of `row` passing `filter`, in native order.
    fn get(&self, table: &str, row: &[u8], filter: &CellFilter) -> Result<Vec<StoredCell>>;

    /// Delete the exact cell versions named by `targets`. Missing targets
    /// are ignored.
    fn delete(&self, table: &str, row: &[u8], targets: &[CellRef]) -> Result<()>;

    /// Return rows in `[start, stop)` (either bound absent = unbounded) whose
    /// cells pass `filter`, ascending by row. Rows with no passing cell are
    /// omitted.
    fn scan(
        &self,
        table: &str,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        filter: &CellFilter,
    ) -> Result<Vec<StoredRow>>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Cell coordinate ordered the way the wide-column store orders cells:
/// family ascending, qualifier ascending, timestamp descending.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CellCoord {
    family: Vec<u8>,
    qualifier: Vec<u8>,
    timestamp: i64,
}

impl Ord for CellCoord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.family
            .cmp(&other.family)
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
    }
}

impl PartialOrd for CellCoord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Table {
    families: BTreeSet<Vec<u8>>,
    rows: BTreeMap<Vec<u8>, BTreeMap<CellCoord, Vec<u8>>>,
}

/// An in-process [`ColumnStore`]. Interior locking keeps the trait surface
/// `&self` so one store can be shared between a proxy and its bucketizers.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables
            .read()
            .map_err(|_| CryptcellError::Store("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables
            .write()
            .map_err(|_| CryptcellError::Store("store lock poisoned".into()))
    }
}

fn collect_cells(
    cells: &BTreeMap<CellCoord, Vec<u8>>,
    filter: &CellFilter,
) -> Vec<StoredCell> {
    cells
        .iter()
        .map(|(coord, value)| StoredCell {
            family: coord.family.clone(),
            qualifier: coord.qualifier.clone(),
            timestamp: coord.timestamp,
            value: value.clone(),
        })
        .filter(|cell| filter.matches(cell))
        .map(|mut cell| {
            if filter.key_only {
                cell.value.clear();
            }
            cell
        })
        .collect()
}

impl ColumnStore for MemoryStore {
    fn create_table(&self, table: &str, families: &[Vec<u8>]) -> Result<()> {
        let mut tables = self.write()?;
        if tables.contains_key(table) {
            return Ok(());
        }
        if families.is_empty() {
            return Err(CryptcellError::Validation(
                "table needs at least one family".into(),
            ));
        }
        let mut t = Table::default();
        t.families.extend(families.iter().cloned());
        tables.insert(table.to_string(), t);
        Ok(())
    }

    fn delete_table(&self, table: &str) -> Result<()> {
        self.write()?.remove(table);
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(table))
    }

    fn put(&self, table: &str, row: &[u8], cells: &[StoredCell]) -> Result<()> {
        if row.is_empty() {
            return Err(CryptcellError::Validation("row key is empty".into()));
        }
        let mut tables = self.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CryptcellError::NotFound(format!("table {}", table)))?;
        for cell in cells {
            if !t.families.contains(&cell.family) {
                return Err(CryptcellError::Store(format!(
                    "unknown family {:?} in table {}",
                    cell.family, table
                )));
            }
        }
        let slot = t.rows.entry(row.to_vec()).or_default();
        for cell in cells {
            slot.insert(
                CellCoord {
                    family: cell.family.clone(),
                    qualifier: cell.qualifier.clone(),
                    timestamp: cell.timestamp,
                },
                cell.value.clone(),
            );
        }
        Ok(())
    }

    fn get(&self, table: &str, row: &[u8], filter: &CellFilter) -> Result<Vec<StoredCell>> {
        let tables = self.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| CryptcellError::NotFound(format!("table {}", table)))?;
        Ok(t.rows
            .get(row)
            .map(|cells| collect_cells(cells, filter))
            .unwrap_or_default())
    }

    fn delete(&self, table: &str, row: &[u8], targets: &[CellRef]) -> Result<()> {
        let mut tables = self.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CryptcellError::NotFound(format!("table {}", table)))?;
        if let Some(cells) = t.rows.get_mut(row) {
            for target in targets {
                cells.remove(&CellCoord {
                    family: target.family.clone(),
                    qualifier: target.qualifier.clone(),
                    timestamp: target.timestamp,
                });
            }
            if cells.is_empty() {
                t.rows.remove(row);
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        table: &str,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        filter: &CellFilter,
    ) -> Result<Vec<StoredRow>> {
        let tables = self.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| CryptcellError::NotFound(format!("table {}", table)))?;
        let mut out = Vec::new();
        for (row, cells) in &t.rows {
            if let Some(start) = start {
                if row.as_slice() < start {
                    continue;
                }
            }
            if let Some(stop) = stop {
                if row.as_slice() >= stop {
                    break;
                }
            }
            let cells = collect_cells(cells, filter);
            if !cells.is_empty() {
                out.push(StoredRow {
                    row: row.clone(),
                    cells,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(family: &[u8], qualifier: &[u8], ts: i64, value: &[u8]) -> StoredCell {
        StoredCell {
            family: family.to_vec(),
            qualifier: qualifier.to_vec(),
            timestamp: ts,
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.create_table("t", &[b"f".to_vec()]).unwrap();
        store
            .put("t", b"row1", &[cell(b"f", b"q1", 5, b"v1")])
            .unwrap();

        let cells = store.get("t", b"row1", &CellFilter::new()).unwrap();
        assert_eq!(cells, vec![cell(b"f", b"q1", 5, b"v1")]);
    }

    #[test]
    fn test_cell_order_is_family_qualifier_then_ts_desc() {
        let store = MemoryStore::new();
        store.create_table("t", &[b"f".to_vec()]).unwrap();
        store
            .put(
                "t",
                b"r",
                &[
                    cell(b"f", b"q", 1, b"old"),
                    cell(b"f", b"q", 9, b"new"),
                    cell(b"f", b"a", 3, b"x"),
                ],
            )
            .unwrap();

        let cells = store.get("t", b"r", &CellFilter::new()).unwrap();
        let keys: Vec<(&[u8], i64)> = cells
            .iter()
            .map(|c| (c.qualifier.as_slice(), c.timestamp))
            .collect();
        assert_eq!(keys, vec![(b"a".as_ref(), 3), (b"q".as_ref(), 9), (b"q".as_ref(), 1)]);
    }

    #[test]
    fn test_filters() {
        let store = MemoryStore::new();
        store
            .create_table("t", &[b"f1".to_vec(), b"f2".to_vec()])
            .unwrap();
        store
            .put(
                "t",
                b"r",
                &[
                    cell(b"f1", b"abc", 1, b"1"),
                    cell(b"f1", b"abd", 2, b"2"),
                    cell(b"f2", b"xyz", 3, b"3"),
                ],
            )
            .unwrap();

        let filter = CellFilter::new()
            .family(b"f1".to_vec())
            .qualifier_prefix(b"ab".to_vec())
            .time_range(TimeRange::new(2, 10));
        let cells = store.get("t", b"r", &filter).unwrap();
        assert_eq!(cells, vec![cell(b"f1", b"abd", 2, b"2")]);

        let key_only = CellFilter::new().key_only();
        let cells = store.get("t", b"r", &key_only).unwrap();
        assert!(cells.iter().all(|c| c.value.is_empty()));
    }

    #[test]
    fn test_scan_range_is_half_open() {
        let store = MemoryStore::new();
        store.create_table("t", &[b"f".to_vec()]).unwrap();
        for row in [b"a".as_ref(), b"b".as_ref(), b"c".as_ref()] {
            store.put("t", row, &[cell(b"f", b"q", 1, b"v")]).unwrap();
        }

        let rows = store
            .scan("t", Some(b"a"), Some(b"c"), &CellFilter::new())
            .unwrap();
        let names: Vec<&[u8]> = rows.iter().map(|r| r.row.as_slice()).collect();
        assert_eq!(names, vec![b"a".as_ref(), b"b".as_ref()]);
    }

    #[test]
    fn test_delete_exact_version_only() {
        let store = MemoryStore::new();
        store.create_table("t", &[b"f".to_vec()]).unwrap();
        store
            .put(
                "t",
                b"r",
                &[cell(b"f", b"q", 1, b"old"), cell(b"f", b"q", 2, b"new")],
            )
            .unwrap();

        store
            .delete(
                "t",
                b"r",
                &[CellRef {
                    family: b"f".to_vec(),
                    qualifier: b"q".to_vec(),
                    timestamp: 2,
                }],
            )
            .unwrap();

        let cells = store.get("t", b"r", &CellFilter::new()).unwrap();
        assert_eq!(cells, vec![cell(b"f", b"q", 1, b"old")]);
    }

    #[test]
    fn test_unknown_table_and_family() {
        let store = MemoryStore::new();
        assert!(store.get("missing", b"r", &CellFilter::new()).is_err());

        store.create_table("t", &[b"f".to_vec()]).unwrap();
        assert!(store
            .put("t", b"r", &[cell(b"g", b"q", 1, b"v")])
            .is_err());
    }
}

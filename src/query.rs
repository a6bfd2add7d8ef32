//! Plaintext request and result types for the proxy API.
//!
//! These mirror the shape of a wide-column store's client API but carry
//! plaintext components; the proxy rewrites them into their encrypted
//! equivalents. Plaintext time ranges are inclusive on both ends, unlike
//! the store's half-open ranges.

use std::collections::{BTreeMap, BTreeSet};

/// A plaintext cell returned by `get` and `scan`.
///
/// Ordering follows the store's native comparator: family ascending,
/// qualifier ascending, timestamp descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.family
            .cmp(&other.family)
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One plaintext row with its accepted cells, in native cell order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub row: Vec<u8>,
    pub cells: Vec<Cell>,
}

/// Family selection for reads: each requested family maps to either all of
/// its qualifiers (`None`) or an explicit qualifier set. An empty map
/// selects every family.
pub type FamilyMap = BTreeMap<Vec<u8>, Option<BTreeSet<Vec<u8>>>>;

/// A plaintext point read over one row.
#[derive(Debug, Clone)]
pub struct Get {
    pub row: Vec<u8>,
    pub families: FamilyMap,
    /// Inclusive lower bound.
    pub min_time: i64,
    /// Inclusive upper bound.
    pub max_time: i64,
}

impl Get {
    /// All families, all qualifiers, all time.
    pub fn row(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            families: FamilyMap::new(),
            min_time: 0,
            max_time: i64::MAX,
        }
    }

    /// Restrict to a whole family.
    pub fn family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.insert(family.into(), None);
        self
    }

    /// Restrict to one qualifier of a family; may be called repeatedly.
    pub fn column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        let quals = self
            .families
            .entry(family.into())
            .or_insert_with(|| Some(BTreeSet::new()));
        if let Some(quals) = quals {
            quals.insert(qualifier.into());
        }
        self
    }

    /// Inclusive timestamp bounds.
    pub fn time_range(mut self, min: i64, max: i64) -> Self {
        self.min_time = min;
        self.max_time = max;
        self
    }

    pub fn at_time(self, ts: i64) -> Self {
        self.time_range(ts, ts)
    }
}

/// A cell to write. A `None` timestamp means "now", resolved to wall-clock
/// time by the proxy before wrapping.
#[derive(Debug, Clone)]
pub struct PutCell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: Option<i64>,
    pub value: Vec<u8>,
}

/// A plaintext write of one or more cells under a row.
#[derive(Debug, Clone)]
pub struct Put {
    pub row: Vec<u8>,
    pub cells: Vec<PutCell>,
}

impl Put {
    pub fn row(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            cells: Vec::new(),
        }
    }

    pub fn cell(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        ts: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.cells.push(PutCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: Some(ts),
            value: value.into(),
        });
        self
    }

    /// Timestamp resolved to the current wall-clock time at write.
    pub fn cell_now(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.cells.push(PutCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: None,
            value: value.into(),
        });
        self
    }
}

/// One delete scope under a row. Timestamped variants remove versions at or
/// before the given instant; the others remove every version in scope.
#[derive(Debug, Clone)]
pub enum DeleteOp {
    /// The whole row.
    Row,
    /// All cells of the row at or before `ts`.
    RowBefore(i64),
    /// All cells of one family.
    Family(Vec<u8>),
    /// All cells of one family at or before `ts`.
    FamilyBefore(Vec<u8>, i64),
    /// Every version of one column.
    Column(Vec<u8>, Vec<u8>),
    /// Versions of one column at or before `ts`.
    ColumnBefore(Vec<u8>, Vec<u8>, i64),
    /// The exact version of one column at `ts`.
    ColumnAt(Vec<u8>, Vec<u8>, i64),
    /// The latest version of one column. Finding the true latest would
    /// require fetching and sorting every version; not implemented.
    ColumnLatest(Vec<u8>, Vec<u8>),
}

/// A plaintext delete over one row.
#[derive(Debug, Clone)]
pub struct Delete {
    pub row: Vec<u8>,
    pub ops: Vec<DeleteOp>,
}

impl Delete {
    pub fn row(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            ops: vec![DeleteOp::Row],
        }
    }

    pub fn op(row: impl Into<Vec<u8>>, op: DeleteOp) -> Self {
        Self {
            row: row.into(),
            ops: vec![op],
        }
    }
}

/// A plaintext range read over rows `[start, stop)`.
#[derive(Debug, Clone)]
pub struct Scan {
    pub start: Option<Vec<u8>>,
    pub stop: Option<Vec<u8>>,
    pub families: FamilyMap,
    pub min_time: i64,
    pub max_time: i64,
}

impl Scan {
    /// Unbounded scan over the whole table.
    pub fn all() -> Self {
        Self {
            start: None,
            stop: None,
            families: FamilyMap::new(),
            min_time: 0,
            max_time: i64::MAX,
        }
    }

    /// Half-open row range `[start, stop)`.
    pub fn range(start: impl Into<Vec<u8>>, stop: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Some(start.into()),
            stop: Some(stop.into()),
            ..Self::all()
        }
    }

    pub fn family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.insert(family.into(), None);
        self
    }

    pub fn column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        let quals = self
            .families
            .entry(family.into())
            .or_insert_with(|| Some(BTreeSet::new()));
        if let Some(quals) = quals {
            quals.insert(qualifier.into());
        }
        self
    }

    pub fn time_range(mut self, min: i64, max: i64) -> Self {
        self.min_time = min;
        self.max_time = max;
        self
    }
}

/// Whether a plaintext cell satisfies a family map filter.
pub(crate) fn family_map_matches(families: &FamilyMap, family: &[u8], qualifier: &[u8]) -> bool {
    if families.is_empty() {
        return true;
    }
    match families.get(family) {
        None => false,
        Some(None) => true,
        Some(Some(quals)) => quals.contains(qualifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_order_matches_store_comparator() {
        let mk = |f: &[u8], q: &[u8], ts: i64| Cell {
            family: f.to_vec(),
            qualifier: q.to_vec(),
            timestamp: ts,
            value: Vec::new(),
        };
        let mut cells = vec![
            mk(b"f2", b"a", 1),
            mk(b"f1", b"b", 5),
            mk(b"f1", b"b", 9),
            mk(b"f1", b"a", 1),
        ];
        cells.sort();
        let order: Vec<(&[u8], &[u8], i64)> = cells
            .iter()
            .map(|c| (c.family.as_slice(), c.qualifier.as_slice(), c.timestamp))
            .collect();
        assert_eq!(
            order,
            vec![
                (b"f1".as_ref(), b"a".as_ref(), 1),
                (b"f1".as_ref(), b"b".as_ref(), 9),
                (b"f1".as_ref(), b"b".as_ref(), 5),
                (b"f2".as_ref(), b"a".as_ref(), 1),
            ]
        );
    }

    #[test]
    fn test_family_map_matching() {
        let empty = FamilyMap::new();
        assert!(family_map_matches(&empty, b"any", b"thing"));

        let get = Get::row("r").family("f1").column("f2", "q");
        assert!(family_map_matches(&get.families, b"f1", b"whatever"));
        assert!(family_map_matches(&get.families, b"f2", b"q"));
        assert!(!family_map_matches(&get.families, b"f2", b"other"));
        assert!(!family_map_matches(&get.families, b"f3", b"q"));
    }
}

//! Scan support: the plaintext-row merge queue and the scan iterator.
//!
//! An encrypted scan returns cells keyed by bucket values, so one plaintext
//! row may surface under several encrypted rows and the bucket order only
//! coarsely tracks plaintext order. The scan is therefore two-phase: a
//! single key-only pass groups every observed wrapped qualifier under its
//! unwrapped plaintext row ([`ScannerQueue`]), then [`ScanIter`] drains the
//! queue in plaintext row order, issuing one targeted encrypted Get per row
//! and re-validating candidates exactly as a point Get would.

use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::cmp::Reverse;

use crate::crypter::Crypter;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::query::{Row, Scan};

/// Groups the wrapped qualifiers of scan candidates by plaintext row and
/// yields the rows in ascending byte order.
#[derive(Default)]
pub struct ScannerQueue {
    heap: BinaryHeap<Reverse<Vec<u8>>>,
    map: HashMap<Vec<u8>, BTreeSet<Vec<u8>>>,
}

impl ScannerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one wrapped qualifier observed for `plain_row`.
    pub fn push(&mut self, plain_row: Vec<u8>, wrapped_qualifier: Vec<u8>) {
        match self.map.get_mut(&plain_row) {
            Some(set) => {
                set.insert(wrapped_qualifier);
            }
            None => {
                self.heap.push(Reverse(plain_row.clone()));
                let mut set = BTreeSet::new();
                set.insert(wrapped_qualifier);
                self.map.insert(plain_row, set);
            }
        }
    }

    /// Remove and return the smallest pending plaintext row with its
    /// wrapped qualifiers.
    pub fn pop(&mut self) -> Option<(Vec<u8>, BTreeSet<Vec<u8>>)> {
        let Reverse(row) = self.heap.pop()?;
        let set = self.map.remove(&row).unwrap_or_default();
        Some((row, set))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Iterator over the plaintext rows of an encrypted scan.
///
/// Rows whose candidates all turn out to be false positives are skipped
/// rather than yielded empty.
pub struct ScanIter<'a, C: Crypter> {
    proxy: &'a mut Proxy<C>,
    scan: Scan,
    queue: ScannerQueue,
}

impl<'a, C: Crypter> ScanIter<'a, C> {
    pub(crate) fn new(proxy: &'a mut Proxy<C>, scan: Scan, queue: ScannerQueue) -> Self {
        Self { proxy, scan, queue }
    }

    /// The next non-empty plaintext row, or `None` when exhausted.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        while let Some((row, wrapped_qualifiers)) = self.queue.pop() {
            let result = self
                .proxy
                .get_for_scan(&self.scan, &row, &wrapped_qualifiers)?;
            if !result.cells.is_empty() {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Drain the remaining rows into a vector.
    pub fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl<C: Crypter> Iterator for ScanIter<'_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_orders_rows_and_groups_qualifiers() {
        let mut q = ScannerQueue::new();
        q.push(b"neo".to_vec(), b"enc1".to_vec());
        q.push(b"aragorn".to_vec(), b"enc2".to_vec());
        q.push(b"neo".to_vec(), b"enc3".to_vec());
        q.push(b"neo".to_vec(), b"enc3".to_vec());

        assert_eq!(q.len(), 2);

        let (row, set) = q.pop().unwrap();
        assert_eq!(row, b"aragorn");
        assert_eq!(set.len(), 1);

        let (row, set) = q.pop().unwrap();
        assert_eq!(row, b"neo");
        assert_eq!(set.len(), 2);

        assert!(q.pop().is_none());
        assert!(q.is_empty());
    }
}

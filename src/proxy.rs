//! The query-rewriting proxy.
//!
//! A proxy owns a crypter and a handle to the backing store. Plaintext
//! requests are rewritten into their encrypted equivalents: keys become
//! index data, time ranges become wrapped-timestamp ranges, and qualifier
//! selections become prefix filters over wrapped qualifiers. Because index
//! data collides across plaintext values by design, every candidate the
//! store returns is unwrapped and compared against the original plaintext
//! query before it is accepted; this false-positive elimination is what
//! makes the coarse server-side filters sound.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::crypter::{Crypter, KeyParts, Mode1Crypter, Mode2Crypter};
use crate::error::{CryptcellError, Result};
use crate::query::{family_map_matches, Cell, Delete, DeleteOp, Get, Put, Row, Scan};
use crate::scanner::{ScanIter, ScannerQueue};
use crate::store::{CellFilter, CellRef, ColumnStore, StoredCell, TimeRange};

/// Proxy over the bucket-based mode; supports Put, Get, Delete and Scan.
pub type ProxyMode1 = Proxy<Mode1Crypter>;

/// Proxy over the keyed-hash mode; supports Put, Get and Delete.
pub type ProxyMode2 = Proxy<Mode2Crypter>;

/// Encrypted-domain proxy for one table.
pub struct Proxy<C: Crypter> {
    store: Arc<dyn ColumnStore>,
    table: String,
    crypter: C,
}

/// Cell-insertion keeping the store's native comparator order.
fn insert_sorted(cells: &mut Vec<Cell>, cell: Cell) {
    let idx = match cells.binary_search(&cell) {
        Ok(i) | Err(i) => i,
    };
    cells.insert(idx, cell);
}

impl<C: Crypter> Proxy<C> {
    pub fn new(store: Arc<dyn ColumnStore>, table: impl Into<String>, crypter: C) -> Self {
        Self {
            store,
            table: table.into(),
            crypter,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn crypter_mut(&mut self) -> &mut C {
        &mut self.crypter
    }

    /// Create `name` with the wrapped forms of the given plaintext
    /// families. No-op when the table already exists.
    pub fn create_table(&mut self, name: &str, families: &[Vec<u8>]) -> Result<()> {
        if families.is_empty() {
            return Err(CryptcellError::Validation(
                "table needs at least one family".into(),
            ));
        }
        if self.store.table_exists(name)? {
            return Ok(());
        }
        let mut enc_families = Vec::with_capacity(families.len());
        for family in families {
            enc_families.push(self.crypter.index_family_data(family)?);
        }
        // Placeholder family indexes collapse to one entry.
        enc_families.dedup();
        self.store.create_table(name, &enc_families)
    }

    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.store.delete_table(name)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.store.table_exists(name)
    }

    // -----------------------------------------------------------------
    // Put
    // -----------------------------------------------------------------

    /// Wrap and write every cell of `put` under its encrypted row.
    ///
    /// A missing per-cell timestamp is resolved to the current wall-clock
    /// time *before* wrapping, so the timestamp sealed into the qualifier
    /// blob and the stored wrapped timestamp agree.
    pub fn put(&mut self, put: &Put) -> Result<()> {
        if put.cells.is_empty() {
            return Err(CryptcellError::Validation("put has no cells".into()));
        }
        let enc_row = self.crypter.wrap_row(&put.row)?;
        let now = Utc::now().timestamp_millis();

        let mut cells = Vec::with_capacity(put.cells.len());
        for cell in &put.cells {
            let ts = cell.timestamp.unwrap_or(now);
            cells.push(StoredCell {
                family: self.crypter.wrap_family(&cell.family)?,
                qualifier: self
                    .crypter
                    .wrap_qualifier(&put.row, &cell.family, &cell.qualifier, ts)?,
                timestamp: self.crypter.wrap_timestamp(ts)?,
                value: self.crypter.wrap_value(&cell.value)?,
            });
        }
        debug!(table = %self.table, cells = cells.len(), "put");
        self.store.put(&self.table, &enc_row, &cells)
    }

    // -----------------------------------------------------------------
    // Get
    // -----------------------------------------------------------------

    /// Read one plaintext row, in native cell order.
    pub fn get(&mut self, get: &Get) -> Result<Vec<Cell>> {
        let enc_row = self.crypter.index_row_data(&get.row)?;

        let mut filter = CellFilter::new().time_range(
            self.crypter
                .encrypted_time_range(get.min_time, get.max_time)?,
        );
        for (family, qualifiers) in &get.families {
            filter = filter.family(self.crypter.index_family_data(family)?);
            if let Some(qualifiers) = qualifiers {
                for qualifier in qualifiers {
                    filter = filter.qualifier_prefix(self.crypter.index_qualifier_data(qualifier)?);
                }
            }
        }

        let candidates = self.store.get(&self.table, &enc_row, &filter)?;
        debug!(table = %self.table, candidates = candidates.len(), "get");

        let mut out = Vec::new();
        for candidate in candidates {
            let parts = self.crypter.unwrap_key_parts(&candidate.qualifier)?;
            if !self.accept(&parts, &get.row, get.min_time, get.max_time)
                || !family_map_matches(&get.families, &parts.family, &parts.qualifier)
            {
                continue;
            }
            let value = self.crypter.unwrap_value(&candidate.value)?;
            insert_sorted(
                &mut out,
                Cell {
                    family: parts.family,
                    qualifier: parts.qualifier,
                    timestamp: parts.timestamp,
                    value,
                },
            );
        }
        Ok(out)
    }

    fn accept(&self, parts: &KeyParts, row: &[u8], min_time: i64, max_time: i64) -> bool {
        parts.row == row && min_time <= parts.timestamp && parts.timestamp <= max_time
    }

    // -----------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------

    /// Delete the scopes named by `delete`, batched into one store call.
    ///
    /// Each scope issues an encrypted Get as narrow as the available index
    /// data allows, then re-validates every candidate against the plaintext
    /// scope before targeting it.
    pub fn delete(&mut self, delete: &Delete) -> Result<()> {
        let enc_row = self.crypter.index_row_data(&delete.row)?;
        let mut targets = Vec::new();

        for op in &delete.ops {
            match op {
                DeleteOp::Row => {
                    self.collect_targets(&enc_row, &delete.row, None, None, None, false, &mut targets)?
                }
                DeleteOp::RowBefore(ts) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    None,
                    None,
                    Some(*ts),
                    false,
                    &mut targets,
                )?,
                DeleteOp::Family(family) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    Some(family),
                    None,
                    None,
                    false,
                    &mut targets,
                )?,
                DeleteOp::FamilyBefore(family, ts) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    Some(family),
                    None,
                    Some(*ts),
                    false,
                    &mut targets,
                )?,
                DeleteOp::Column(family, qualifier) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    Some(family),
                    Some(qualifier),
                    None,
                    false,
                    &mut targets,
                )?,
                DeleteOp::ColumnBefore(family, qualifier, ts) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    Some(family),
                    Some(qualifier),
                    Some(*ts),
                    false,
                    &mut targets,
                )?,
                DeleteOp::ColumnAt(family, qualifier, ts) => self.collect_targets(
                    &enc_row,
                    &delete.row,
                    Some(family),
                    Some(qualifier),
                    Some(*ts),
                    true,
                    &mut targets,
                )?,
                DeleteOp::ColumnLatest(_, _) => {
                    return Err(CryptcellError::Unsupported(
                        "deleting only the latest version is not implemented",
                    ))
                }
            }
        }

        debug!(table = %self.table, targets = targets.len(), "delete");
        if targets.is_empty() {
            return Ok(());
        }
        self.store.delete(&self.table, &enc_row, &targets)
    }

    /// Resolve one delete scope to exact encrypted cell coordinates.
    #[allow(clippy::too_many_arguments)]
    fn collect_targets(
        &mut self,
        enc_row: &[u8],
        row: &[u8],
        family: Option<&[u8]>,
        qualifier: Option<&[u8]>,
        ts: Option<i64>,
        exact_ts: bool,
        targets: &mut Vec<CellRef>,
    ) -> Result<()> {
        let mut filter = CellFilter::new();
        if let Some(family) = family {
            filter = filter.family(self.crypter.index_family_data(family)?);
        }
        if let Some(qualifier) = qualifier {
            filter = filter.qualifier_prefix(self.crypter.index_qualifier_data(qualifier)?);
        }
        if let Some(ts) = ts {
            let range = if exact_ts {
                TimeRange::at(self.crypter.wrap_timestamp(ts)?)
            } else {
                self.crypter.encrypted_time_range(0, ts)?
            };
            filter = filter.time_range(range);
        }

        let candidates = self.store.get(&self.table, enc_row, &filter)?;
        for candidate in candidates {
            let parts = self.crypter.unwrap_key_parts(&candidate.qualifier)?;
            if parts.row != row {
                continue;
            }
            if let Some(family) = family {
                if parts.family != family {
                    continue;
                }
            }
            if let Some(qualifier) = qualifier {
                if parts.qualifier != qualifier {
                    continue;
                }
            }
            if let Some(ts) = ts {
                let keep = if exact_ts {
                    parts.timestamp == ts
                } else {
                    parts.timestamp <= ts
                };
                if !keep {
                    continue;
                }
            }
            targets.push(CellRef {
                family: candidate.family,
                qualifier: candidate.qualifier,
                timestamp: candidate.timestamp,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------

    /// Range read over plaintext rows `[start, stop)`; order-preserving
    /// modes only.
    ///
    /// Performs the single key-only pass over the encrypted range up front,
    /// grouping candidates by unwrapped plaintext row; the returned
    /// iterator then resolves one row per step.
    pub fn scan(&mut self, scan: Scan) -> Result<ScanIter<'_, C>> {
        if !self.crypter.supports_scan() {
            return Err(CryptcellError::Unsupported(
                "scan requires an order-preserving row index",
            ));
        }

        let start = match &scan.start {
            Some(row) => Some(self.crypter.row_bucket(row)?),
            None => None,
        };
        // A stop row past the last bucket leaves the range open above.
        let stop = match &scan.stop {
            Some(row) => self.crypter.row_next_bucket(row)?,
            None => None,
        };

        let mut filter = CellFilter::new().key_only().time_range(
            self.crypter
                .encrypted_time_range(scan.min_time, scan.max_time)?,
        );
        for (family, qualifiers) in &scan.families {
            filter = filter.family(self.crypter.index_family_data(family)?);
            if let Some(qualifiers) = qualifiers {
                for qualifier in qualifiers {
                    filter = filter.qualifier_prefix(self.crypter.index_qualifier_data(qualifier)?);
                }
            }
        }

        let enc_rows = self
            .store
            .scan(&self.table, start.as_deref(), stop.as_deref(), &filter)?;
        debug!(table = %self.table, enc_rows = enc_rows.len(), "scan candidates");

        let mut queue = ScannerQueue::new();
        for enc_row in enc_rows {
            for cell in enc_row.cells {
                let plain_row = self.crypter.unwrap_row(&cell.qualifier)?;
                let after_start = scan
                    .start
                    .as_deref()
                    .map_or(true, |s| plain_row.as_slice() >= s);
                let before_stop = scan
                    .stop
                    .as_deref()
                    .map_or(true, |e| plain_row.as_slice() < e);
                if after_start && before_stop {
                    queue.push(plain_row, cell.qualifier);
                }
            }
        }

        Ok(ScanIter::new(self, scan, queue))
    }

    /// Resolve one plaintext row of a scan: a targeted encrypted Get
    /// filtered to exactly the wrapped qualifiers observed for that row.
    pub(crate) fn get_for_scan(
        &mut self,
        scan: &Scan,
        plain_row: &[u8],
        wrapped_qualifiers: &BTreeSet<Vec<u8>>,
    ) -> Result<Row> {
        let enc_row = self.crypter.index_row_data(plain_row)?;

        let mut filter = CellFilter::new().time_range(
            self.crypter
                .encrypted_time_range(scan.min_time, scan.max_time)?,
        );
        for wrapped in wrapped_qualifiers {
            filter = filter.qualifier_prefix(wrapped.clone());
        }

        let candidates = self.store.get(&self.table, &enc_row, &filter)?;
        let mut cells = Vec::new();
        for candidate in candidates {
            let parts = self.crypter.unwrap_key_parts(&candidate.qualifier)?;
            if !self.accept(&parts, plain_row, scan.min_time, scan.max_time)
                || !family_map_matches(&scan.families, &parts.family, &parts.qualifier)
            {
                continue;
            }
            let value = self.crypter.unwrap_value(&candidate.value)?;
            insert_sorted(
                &mut cells,
                Cell {
                    family: parts.family,
                    qualifier: parts.qualifier,
                    timestamp: parts.timestamp,
                    value,
                },
            );
        }

        Ok(Row {
            row: plain_row.to_vec(),
            cells,
        })
    }
}

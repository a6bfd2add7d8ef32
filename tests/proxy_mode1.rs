//! End-to-end tests for the bucket-based proxy: put/get/delete/scan over an
//! in-memory store, including false-positive elimination under deliberate
//! bucket collisions.

use std::sync::Arc;

use cryptcell::bucketizer::{ByteBucketizer, LongBucketizer};
use cryptcell::cipher::{AesCtr, AesKey, Cipher};
use cryptcell::crypter::Mode1Crypter;
use cryptcell::query::{Delete, DeleteOp, Get, Put, Scan};
use cryptcell::random::SystemRandomSource;
use cryptcell::store::{ColumnStore, MemoryStore};
use cryptcell::{CryptcellError, ProxyMode1};

const TABLE: &str = "vault";
const FAM: &[u8] = b"fam1";

fn cipher(seed: u8) -> Box<dyn Cipher> {
    Box::new(AesCtr::new(AesKey::from_bytes(&[seed; 16]).unwrap()))
}

/// Fresh store + proxy with bucketizers of `input_bits`. Small bit widths
/// force plaintext collisions in the indexes.
fn proxy(input_bits: u32) -> ProxyMode1 {
    let store: Arc<dyn ColumnStore> = Arc::new(MemoryStore::new());
    let rng = SystemRandomSource::new();
    let rows = ByteBucketizer::create(store.clone(), "rows", input_bits, &rng).unwrap();
    let fams = ByteBucketizer::create(store.clone(), "fams", input_bits, &rng).unwrap();
    let quas = ByteBucketizer::create(store.clone(), "quas", input_bits, &rng).unwrap();
    // Wide enough for wall-clock millisecond timestamps.
    let ts = LongBucketizer::create(store.clone(), "ts", 0, 4_000_000_000_000, 64, &rng).unwrap();
    let crypter = Mode1Crypter::new(
        Box::new(rows),
        Box::new(fams),
        Box::new(quas),
        Box::new(ts),
        cipher(1),
        cipher(2),
    );
    let mut proxy = ProxyMode1::new(store, TABLE, crypter);
    proxy.create_table(TABLE, &[FAM.to_vec()]).unwrap();
    proxy
}

#[test]
fn test_put_get_roundtrip() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("dark knight")
                .cell(FAM, "car", 1001, "batmobile")
                .cell(FAM, "alias", 1001, "bruce"),
        )
        .unwrap();

    let cells = proxy.get(&Get::row("dark knight")).unwrap();
    assert_eq!(cells.len(), 2);
    // Native order: qualifier ascending within a family.
    assert_eq!(cells[0].qualifier, b"alias");
    assert_eq!(cells[0].value, b"bruce");
    assert_eq!(cells[1].qualifier, b"car");
    assert_eq!(cells[1].value, b"batmobile");
    assert!(cells.iter().all(|c| c.timestamp == 1001 && c.family == FAM));
}

#[test]
fn test_get_missing_row_is_empty() {
    let mut proxy = proxy(4);
    assert!(proxy.get(&Get::row("nobody")).unwrap().is_empty());
}

#[test]
fn test_get_column_restriction() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("dark knight")
                .cell(FAM, "car", 1001, "batmobile")
                .cell(FAM, "alias", 1001, "bruce"),
        )
        .unwrap();

    let cells = proxy.get(&Get::row("dark knight").column(FAM, "car")).unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].qualifier, b"car");
}

#[test]
fn test_get_time_range_and_version_order() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("neo")
                .cell(FAM, "job", 1000, "programmer")
                .cell(FAM, "job", 2000, "the one"),
        )
        .unwrap();

    let cells = proxy
        .get(&Get::row("neo").time_range(1500, 2500))
        .unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].value, b"the one");

    // Both versions, newest first.
    let cells = proxy.get(&Get::row("neo")).unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].timestamp, 2000);
    assert_eq!(cells[1].timestamp, 1000);
}

#[test]
fn test_cell_now_resolves_timestamp() {
    let mut proxy = proxy(4);
    proxy
        .put(&Put::row("trinity").cell_now(FAM, "ship", "nebuchadnezzar"))
        .unwrap();

    let cells = proxy.get(&Get::row("trinity")).unwrap();
    assert_eq!(cells.len(), 1);
    assert!(cells[0].timestamp > 0);
}

#[test]
fn test_colliding_rows_stay_separate() {
    // One input bit: every ascii row lands in the same bucket, so both rows
    // share one encrypted row key and separation rests on unwrapping.
    let mut proxy = proxy(1);
    proxy
        .put(&Put::row("aa").cell(FAM, "q", 10, "first"))
        .unwrap();
    proxy
        .put(&Put::row("ab").cell(FAM, "q", 10, "second"))
        .unwrap();

    let cells = proxy.get(&Get::row("aa")).unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].value, b"first");
}

#[test]
fn test_delete_row() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("smith")
                .cell(FAM, "copy", 100, "one")
                .cell(FAM, "copy", 200, "two"),
        )
        .unwrap();
    proxy
        .put(&Put::row("oracle").cell(FAM, "cookie", 100, "baked"))
        .unwrap();

    proxy.delete(&Delete::row("smith")).unwrap();

    assert!(proxy.get(&Get::row("smith")).unwrap().is_empty());
    assert_eq!(proxy.get(&Get::row("oracle")).unwrap().len(), 1);
}

#[test]
fn test_delete_column_before() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("neo")
                .cell(FAM, "job", 1000, "programmer")
                .cell(FAM, "job", 2000, "the one"),
        )
        .unwrap();

    proxy
        .delete(&Delete::op(
            "neo",
            DeleteOp::ColumnBefore(FAM.to_vec(), b"job".to_vec(), 1500),
        ))
        .unwrap();

    let cells = proxy.get(&Get::row("neo")).unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].timestamp, 2000);
}

#[test]
fn test_delete_column_at_exact_version() {
    let mut proxy = proxy(4);
    proxy
        .put(
            &Put::row("neo")
                .cell(FAM, "job", 1000, "programmer")
                .cell(FAM, "job", 2000, "the one"),
        )
        .unwrap();

    proxy
        .delete(&Delete::op(
            "neo",
            DeleteOp::ColumnAt(FAM.to_vec(), b"job".to_vec(), 2000),
        ))
        .unwrap();

    let cells = proxy.get(&Get::row("neo")).unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].timestamp, 1000);
}

#[test]
fn test_delete_latest_unsupported() {
    let mut proxy = proxy(4);
    let err = proxy
        .delete(&Delete::op(
            "neo",
            DeleteOp::ColumnLatest(FAM.to_vec(), b"job".to_vec()),
        ))
        .unwrap_err();
    assert!(matches!(err, CryptcellError::Unsupported(_)));
}

#[test]
fn test_delete_does_not_touch_colliding_row() {
    let mut proxy = proxy(1);
    proxy
        .put(&Put::row("aa").cell(FAM, "q", 10, "first"))
        .unwrap();
    proxy
        .put(&Put::row("ab").cell(FAM, "q", 10, "second"))
        .unwrap();

    proxy.delete(&Delete::row("aa")).unwrap();

    assert!(proxy.get(&Get::row("aa")).unwrap().is_empty());
    assert_eq!(proxy.get(&Get::row("ab")).unwrap().len(), 1);
}

#[test]
fn test_scan_full_table_in_row_order() {
    let mut proxy = proxy(4);
    for row in ["neo", "aragorn", "superman", "dark knight"] {
        proxy
            .put(&Put::row(row).cell(FAM, "name", 100, row))
            .unwrap();
    }

    let rows: Vec<_> = proxy
        .scan(Scan::all())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let names: Vec<&[u8]> = rows.iter().map(|r| r.row.as_slice()).collect();
    assert_eq!(names, [b"aragorn" as &[u8], b"dark knight", b"neo", b"superman"]);
    assert!(rows.iter().all(|r| r.cells.len() == 1));
}

#[test]
fn test_scan_row_range_is_half_open() {
    let mut proxy = proxy(4);
    for row in ["aragorn", "dark knight", "neo", "superman"] {
        proxy
            .put(&Put::row(row).cell(FAM, "name", 100, row))
            .unwrap();
    }

    let rows: Vec<_> = proxy
        .scan(Scan::range("dark knight", "superman"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let names: Vec<&[u8]> = rows.iter().map(|r| r.row.as_slice()).collect();
    assert_eq!(names, [b"dark knight" as &[u8], b"neo"]);
}

#[test]
fn test_scan_time_range() {
    let mut proxy = proxy(4);
    proxy
        .put(&Put::row("aragorn").cell(FAM, "name", 100, "strider"))
        .unwrap();
    proxy
        .put(&Put::row("neo").cell(FAM, "name", 900_000_000, "anderson"))
        .unwrap();

    let rows: Vec<_> = proxy
        .scan(Scan::all().time_range(0, 1000))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row, b"aragorn");
}

#[test]
fn test_scan_under_collisions() {
    let mut proxy = proxy(1);
    for row in ["aa", "ab", "ba"] {
        proxy
            .put(&Put::row(row).cell(FAM, "q", 10, row))
            .unwrap();
    }

    let rows: Vec<_> = proxy
        .scan(Scan::range("aa", "ba"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let names: Vec<&[u8]> = rows.iter().map(|r| r.row.as_slice()).collect();
    assert_eq!(names, [b"aa" as &[u8], b"ab"]);
}

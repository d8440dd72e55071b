#[path = "common/mod.rs"]
mod common;

use common::*;
use tweetdb::{count_keys, group_payloads, stream_sorted, BuildError, PackedGroups, CONDUIT_CAPACITY};

fn packed(rows: &[&[&str]]) -> PackedGroups {
    let input = csv_bytes(rows);
    let counts = count_keys(input.as_slice()).unwrap();
    group_payloads(input.as_slice(), &counts).unwrap()
}

fn sample() -> PackedGroups {
    packed(&[
        &tweet("1", "zoe", "z1"),
        &tweet("2", "Bob", "B1"),
        &tweet("3", "amy", "a1"),
        &tweet("4", "zoe", "z2"),
        &tweet("5", "amy", "a2"),
        &tweet("6", "Bob", "B2"),
        &tweet("7", "lone", "dropped"),
        &tweet("8", "amy", "a3"),
    ])
}

/// Authors ascend byte-wise (uppercase first), posts keep input order.
#[test]
fn streams_sorted_authors_in_input_order() {
    let groups = sample();
    let (got, stats) = stream_sorted(&groups, |rx| {
        Ok(rx
            .into_iter()
            .map(|r| (String::from_utf8_lossy(r.user).into_owned(), String::from_utf8_lossy(r.body).into_owned()))
            .collect::<Vec<_>>())
    })
    .unwrap();

    let want: Vec<(String, String)> = [
        ("Bob", "B1"),
        ("Bob", "B2"),
        ("amy", "a1"),
        ("amy", "a2"),
        ("amy", "a3"),
        ("zoe", "z1"),
        ("zoe", "z2"),
    ]
    .iter()
    .map(|(u, b)| (u.to_string(), b.to_string()))
    .collect();
    assert_eq!(got, want);
    assert!(stats.completed);
    assert_eq!(stats.authors, 3);
    assert_eq!(stats.records, 7);
}

/// Record bodies point into the packed buffer rather than copies of it.
#[test]
fn records_borrow_the_packed_buffer() {
    let groups = sample();
    let (ok, _) = stream_sorted(&groups, |rx| {
        Ok(rx.into_iter().all(|r| {
            let views = groups.views(std::str::from_utf8(r.user).unwrap()).unwrap();
            views.iter().any(|v| std::ptr::eq(groups.payload(*v).as_ptr(), r.body.as_ptr()))
        }))
    })
    .unwrap();
    assert!(ok);
}

#[test]
fn conduit_holds_one_record() {
    assert_eq!(CONDUIT_CAPACITY, 1);
    let groups = sample();
    let (max_queued, _) = stream_sorted(&groups, |rx| {
        assert_eq!(rx.capacity(), Some(1));
        let mut max_queued = 0;
        while let Ok(_rec) = rx.recv() {
            std::thread::sleep(std::time::Duration::from_millis(2));
            max_queued = max_queued.max(rx.len());
        }
        Ok(max_queued)
    })
    .unwrap();
    assert!(max_queued <= 1);
}

#[test]
fn empty_groups_close_immediately() {
    let groups = packed(&[]);
    let (n, stats) = stream_sorted(&groups, |rx| Ok(rx.into_iter().count())).unwrap();
    assert_eq!(n, 0);
    assert!(stats.completed);
    assert_eq!(stats.records, 0);
}

/// A consumer that stops early must not leave the producer blocked.
#[test]
fn early_consumer_exit_releases_producer() {
    let groups = sample();
    let (first, stats) = stream_sorted(&groups, |rx| Ok(rx.recv().ok().map(|r| r.body.to_vec()))).unwrap();
    assert_eq!(first.as_deref(), Some(&b"B1"[..]));
    assert!(!stats.completed);
    assert!(stats.records < 7);
}

/// A failing consumer surfaces its error and the run still terminates.
#[test]
fn consumer_error_is_returned() {
    let groups = sample();
    let err = stream_sorted(&groups, |rx| -> tweetdb::Result<()> {
        let _ = rx.recv();
        Err(BuildError::Sink("disk full".to_string()))
    })
    .unwrap_err();
    assert!(matches!(err, BuildError::Sink(ref m) if m == "disk full"), "{err}");
}

//! Lock behavior of concurrent appends.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{append_request, branch_for, TestEnv};
use floe_lock::LockManager;
use floe_table::Table;

#[test]
fn test_appends_to_one_table_are_totally_ordered() {
    const WRITERS: i64 = 6;

    let env = Arc::new(TestEnv::new());
    let table_info = env.create_table("events");
    let barrier = Arc::new(Barrier::new(WRITERS as usize));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let env = Arc::clone(&env);
            let barrier = Arc::clone(&barrier);
            let key = format!("writer-{i}");
            let request = append_request(&table_info, i * 50..(i + 1) * 50, Some(key.as_str()));
            thread::spawn(move || {
                barrier.wait();
                env.service.append_records(&request)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().unwrap());
    }

    let table = env.load(&table_info);
    assert_eq!(env.count(&table_info), 300);

    let log = table.metadata().commit_log();
    assert_eq!(log.len(), WRITERS as usize);
    for (i, entry) in log.iter().enumerate() {
        assert_eq!(entry.version, i as u64 + 1);
        // each commit holds exactly one batch and its retention branch
        assert_eq!(entry.snapshots.len(), 1);
        assert_eq!(entry.operations.len(), 2);
        assert!(entry.operations[0].starts_with("append"));
        assert!(entry.operations[1].starts_with("create branch __peerdb-idem-writer-"));
    }

    for i in 0..WRITERS {
        let branch = table
            .metadata()
            .snapshot_ref(&branch_for(&format!("writer-{i}")))
            .unwrap();
        let snapshot = branch.snapshot_id.unwrap();
        assert!(log.iter().any(|entry| entry.snapshots == [snapshot]));
    }

    let stats = env.locks.stats().snapshot();
    assert_eq!(stats.acquisitions, WRITERS as u64);
    assert_eq!(stats.releases, WRITERS as u64);
}

#[test]
fn test_held_lock_does_not_block_other_tables() {
    let env = TestEnv::new();
    let busy = env.create_table("busy");
    let free = env.create_table("free");

    let _held = env.locks.acquire(&busy.lock_key()).unwrap();
    assert!(env
        .service
        .append_records(&append_request(&free, 0..10, Some("k")))
        .unwrap());
    assert_eq!(env.count(&free), 10);
    assert!(env.locks.is_locked(&busy.lock_key()));
}

#[test]
fn test_writer_waits_for_held_lock() {
    let env = Arc::new(TestEnv::new());
    let table_info = env.create_table("events");

    let held = env.locks.acquire(&table_info.lock_key()).unwrap();
    let writer = {
        let env = Arc::clone(&env);
        let request = append_request(&table_info, 0..10, Some("late"));
        thread::spawn(move || env.service.append_records(&request))
    };

    while env.locks.waiting(&table_info.lock_key()) == 0 {
        thread::yield_now();
    }
    assert!(env.load(&table_info).metadata().commit_log().is_empty());

    drop(held);
    assert!(writer.join().unwrap().unwrap());
    assert_eq!(env.count(&table_info), 10);
}

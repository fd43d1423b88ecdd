//! Change ingestion through the service.

mod common;

use common::{append_request, TestEnv, SCHEMA};
use floe_common::{BranchOptions, ConflictPolicy, FloeError};
use floe_ingest::{InsertChangesRequest, RecordChange, TableInfo};
use floe_table::{Table, TableScan};

fn changes_request(table_info: &TableInfo, ids: std::ops::Range<i64>, policy: ConflictPolicy) -> InsertChangesRequest {
    InsertChangesRequest {
        table_info: table_info.clone(),
        schema: SCHEMA.to_string(),
        changes: ids
            .map(|id| RecordChange::Insert {
                record: format!(r#"{{"id":{id}}}"#).into(),
            })
            .collect(),
        branch_options: Some(BranchOptions::new("cdc", policy)),
    }
}

#[test]
fn test_branch_conflict_policies() {
    let env = TestEnv::new();
    let table_info = env.create_table("events");
    env.service
        .append_records(&append_request(&table_info, 0..10, None))
        .unwrap();

    assert!(env
        .service
        .insert_changes(&changes_request(&table_info, 10..15, ConflictPolicy::Error))
        .unwrap());

    let err = env
        .service
        .insert_changes(&changes_request(&table_info, 15..20, ConflictPolicy::Error))
        .unwrap_err();
    assert!(matches!(err, FloeError::BranchAlreadyExists { .. }));

    assert!(!env
        .service
        .insert_changes(&changes_request(&table_info, 15..20, ConflictPolicy::Ignore))
        .unwrap());

    assert!(env
        .service
        .insert_changes(&changes_request(&table_info, 20..22, ConflictPolicy::Drop))
        .unwrap());

    let table = env.load(&table_info);
    assert_eq!(env.count(&table_info), 10);
    assert_eq!(TableScan::new(table.as_ref()).use_ref("cdc").count().unwrap(), 12);
}

#[test]
fn test_changes_and_appends_share_the_lock() {
    let env = TestEnv::new();
    let table_info = env.create_table("events");

    env.service
        .insert_changes(&changes_request(&table_info, 0..3, ConflictPolicy::Error))
        .unwrap();
    env.service
        .append_records(&append_request(&table_info, 3..6, Some("k")))
        .unwrap();

    assert_eq!(env.locks.stats().snapshot().acquisitions, 2);
    let table = env.load(&table_info);
    assert_eq!(table.metadata().commit_log().len(), 2);
    assert!(table.has_ref("cdc"));
}

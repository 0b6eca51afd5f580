use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    bulk_write::WriteKind,
    cmap::RawCommandResponse,
    error::{ErrorKind, RETRYABLE_WRITE_ERROR},
    operation::{
        CommitTransaction,
        Find,
        Operation,
        Retryability,
        RunCommand,
        WriteBatch,
    },
    options::{
        Acknowledgment,
        BulkWriteOptions,
        FindOptions,
        ServerAddress,
        WriteConcern,
    },
    sdam::{ServerDescription, ServerType},
    Namespace,
};

fn server(max_wire_version: i32) -> ServerDescription {
    ServerDescription::builder()
        .address(ServerAddress::default())
        .server_type(ServerType::RsPrimary)
        .max_wire_version(max_wire_version)
        .build()
}

fn ns() -> Namespace {
    Namespace::new("db", "coll")
}

pub(crate) fn handle_response_test<T: Operation>(
    op: &T,
    response_doc: Document,
) -> crate::error::Result<T::O> {
    let response = RawCommandResponse::new(ServerAddress::default(), response_doc);
    op.handle_response(response, &server(21))
}

fn insert_batch(options: BulkWriteOptions) -> WriteBatch {
    WriteBatch::new(
        ns(),
        WriteKind::Insert,
        vec![
            doc! { "_id": 1, "x": 1 },
            doc! { "_id": 2, "x": 2 },
            doc! { "_id": 3, "x": 3 },
        ],
        options,
    )
}

#[test]
fn build_insert_batch() {
    let mut op = insert_batch(
        BulkWriteOptions::builder()
            .write_concern(WriteConcern::from(Acknowledgment::Majority))
            .build(),
    );
    let cmd = op.build(&server(21)).unwrap();

    assert_eq!(cmd.name, "insert");
    assert_eq!(cmd.target_db, "db");
    assert_eq!(
        cmd.body,
        doc! {
            "insert": "coll",
            "documents": [
                { "_id": 1, "x": 1 },
                { "_id": 2, "x": 2 },
                { "_id": 3, "x": 3 },
            ],
            "ordered": true,
            "writeConcern": { "w": "majority" },
        }
    );
}

#[test]
fn build_drops_empty_write_concern() {
    let mut op = insert_batch(
        BulkWriteOptions::builder()
            .ordered(false)
            .write_concern(WriteConcern::default())
            .build(),
    );
    let cmd = op.build(&server(21)).unwrap();

    assert!(matches!(cmd.body.get_bool("ordered"), Ok(false)));
    assert!(!cmd.body.contains_key("writeConcern"));
}

#[test]
fn build_rejects_collation_on_old_server() {
    let mut op = WriteBatch::new(
        ns(),
        WriteKind::Delete,
        vec![doc! { "q": { "x": 1 }, "limit": 1, "collation": { "locale": "fr" } }],
        BulkWriteOptions::default(),
    );

    let error = op.build(&server(4)).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::IncompatibleServer { .. }));
    assert!(op.build(&server(5)).is_ok());
}

#[test]
fn build_rejects_array_filters_on_old_server() {
    let mut op = WriteBatch::new(
        ns(),
        WriteKind::Update,
        vec![doc! {
            "q": {},
            "u": { "$set": { "a.$[e]": 1 } },
            "multi": false,
            "arrayFilters": [{ "e": { "$gt": 1 } }],
        }],
        BulkWriteOptions::default(),
    );

    let error = op.build(&server(5)).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::IncompatibleServer { .. }));
    assert!(op.build(&server(6)).is_ok());
}

#[test]
fn handle_update_response() {
    let op = WriteBatch::new(
        ns(),
        WriteKind::Update,
        vec![
            doc! { "q": { "x": 1 }, "u": { "$inc": { "x": 1 } }, "multi": false },
            doc! { "q": { "x": 5 }, "u": { "$inc": { "x": 1 } }, "multi": false, "upsert": true },
        ],
        BulkWriteOptions::default(),
    );

    let result = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 2,
            "nModified": 1,
            "upserted": [{ "index": 1, "_id": "new" }],
        },
    )
    .unwrap();

    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.upserted_ids.get(&1), Some(&Bson::String("new".into())));
}

#[test]
fn handle_ordered_insert_write_error() {
    let op = insert_batch(BulkWriteOptions::default());

    let error = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
        },
    )
    .unwrap_err();

    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected bulk write error, got {:?}", error);
    };
    assert_eq!(failure.write_errors.len(), 1);
    assert_eq!(failure.write_errors[0].index, 1);
    assert_eq!(failure.write_errors[0].code, 11000);

    let partial = failure.partial_result.as_ref().unwrap();
    assert_eq!(partial.inserted_count, 1);
    assert_eq!(partial.inserted_ids.keys().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn handle_unordered_insert_write_error() {
    let op = insert_batch(BulkWriteOptions::builder().ordered(false).build());

    let error = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 2,
            "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
        },
    )
    .unwrap_err();

    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected bulk write error, got {:?}", error);
    };
    let partial = failure.partial_result.as_ref().unwrap();
    assert_eq!(partial.inserted_ids.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
}

#[test]
fn handle_write_concern_error_keeps_labels() {
    let op = insert_batch(BulkWriteOptions::default());

    let error = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 3,
            "writeConcernError": {
                "code": 91,
                "codeName": "ShutdownInProgress",
                "errmsg": "shutting down",
                "errorLabels": [RETRYABLE_WRITE_ERROR],
            },
        },
    )
    .unwrap_err();

    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected bulk write error, got {:?}", error);
    };
    assert!(failure.write_errors.is_empty());
    assert_eq!(failure.write_concern_error.as_ref().map(|wc| wc.code), Some(91));
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
}

#[test]
fn unacknowledged_batch_reports_nothing() {
    let op = insert_batch(
        BulkWriteOptions::builder()
            .write_concern(WriteConcern::from(Acknowledgment::Nodes(0)))
            .build(),
    );

    assert!(!op.is_acknowledged());
    let result = handle_response_test(&op, doc! { "ok": 1 }).unwrap();
    assert_eq!(result.inserted_count, 0);
    assert!(result.inserted_ids.is_empty());
}

#[test]
fn multi_statements_do_not_support_transaction_numbers() {
    let update_many = WriteBatch::new(
        ns(),
        WriteKind::Update,
        vec![doc! { "q": {}, "u": { "$set": { "x": 1 } }, "multi": true }],
        BulkWriteOptions::default(),
    );
    let delete_many = WriteBatch::new(
        ns(),
        WriteKind::Delete,
        vec![doc! { "q": {}, "limit": 0 }],
        BulkWriteOptions::default(),
    );
    let delete_one = WriteBatch::new(
        ns(),
        WriteKind::Delete,
        vec![doc! { "q": {}, "limit": 1 }],
        BulkWriteOptions::default(),
    );

    assert!(!update_many.supports_transaction_numbers());
    assert!(!delete_many.supports_transaction_numbers());
    assert!(delete_one.supports_transaction_numbers());
    assert_eq!(delete_one.retryability(), Retryability::Write);
    assert_eq!(delete_one.name(), "delete");
}

#[test]
fn commit_transaction_retry_uses_majority() {
    let mut op = CommitTransaction::new(None);
    let cmd = op.build(&server(21)).unwrap();
    assert_eq!(cmd.body, doc! { "commitTransaction": 1 });
    assert_eq!(cmd.target_db, "admin");
    assert!(op.requires_session());

    op.update_for_retry();
    let cmd = op.build(&server(21)).unwrap();
    assert_eq!(
        cmd.body,
        doc! {
            "commitTransaction": 1,
            "writeConcern": { "w": "majority", "wtimeout": 10_000 },
        }
    );
}

#[test]
fn run_command_rejects_empty_document() {
    let error = RunCommand::new("db".to_string(), Document::new(), None).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn run_command_is_sent_as_is() {
    let mut op = RunCommand::new("db".to_string(), doc! { "ping": 1 }, None).unwrap();
    let cmd = op.build(&server(21)).unwrap();

    assert_eq!(cmd.name, "ping");
    assert_eq!(cmd.body, doc! { "ping": 1 });
    assert_eq!(op.retryability(), Retryability::None);
    assert!(op.supports_sessions());

    let hello = RunCommand::new("admin".to_string(), doc! { "hello": 1 }, None).unwrap();
    assert!(!hello.supports_sessions());
}

#[test]
fn find_reads_first_batch() {
    let mut op = Find::new(
        ns(),
        doc! { "x": { "$gt": 1 } },
        Some(FindOptions::builder().limit(2).build()),
    );
    let cmd = op.build(&server(21)).unwrap();
    assert_eq!(
        cmd.body,
        doc! { "find": "coll", "filter": { "x": { "$gt": 1 } }, "limit": 2_i64 }
    );
    assert_eq!(op.retryability(), Retryability::Read);

    let documents = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "db.coll", "firstBatch": [{ "x": 2 }, { "x": 3 }] },
        },
    )
    .unwrap();
    assert_eq!(documents, vec![doc! { "x": 2 }, doc! { "x": 3 }]);
}

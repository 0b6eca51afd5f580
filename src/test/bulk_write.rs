use pretty_assertions::assert_eq;

use super::util::{network_error, replica_set, server, MockTransport, TestClient};
use crate::{
    bson::{doc, Bson, Document},
    bulk_write::{UpdateModel, WriteModel},
    cmap::Command,
    error::{BulkWriteError, ErrorKind, Result, RETRYABLE_WRITE_ERROR},
    options::{BulkWriteOptions, ClientOptions, Collation, InsertManyOptions},
    sdam::{ServerDescription, ServerType, TopologyDescription},
};

fn small_batches() -> TopologyDescription {
    replica_set([ServerDescription {
        max_write_batch_size: 10,
        ..server("a:27017", ServerType::RsPrimary)
    }])
}

fn eleven_inserts() -> Vec<WriteModel> {
    (0..11)
        .map(|i| WriteModel::insert_one(doc! { "_id": i }))
        .collect()
}

fn statement_count(command: &Command) -> usize {
    command
        .body
        .get_array(crate::bulk_write::WriteKind::Insert.payload_key())
        .map(|statements| statements.len())
        .unwrap_or_default()
}

/// Acknowledges the statements of a batch except the given batch-local indices. An ordered batch
/// stops at its first failure.
fn reply_failing(command: &Command, failing: &[usize]) -> Result<Document> {
    let ordered = command.body.get_bool("ordered").unwrap_or(true);
    let write_errors: Vec<Document> = failing
        .iter()
        .map(|index| {
            doc! {
                "index": *index as i32,
                "code": 11000,
                "codeName": "DuplicateKey",
                "errmsg": "E11000 duplicate key error",
            }
        })
        .collect();
    let n = match failing.iter().min() {
        Some(first) if ordered => *first,
        _ => statement_count(command) - failing.len(),
    };
    let mut reply = doc! { "ok": 1, "n": n as i32 };
    if !write_errors.is_empty() {
        reply.insert("writeErrors", write_errors);
    }
    Ok(reply)
}

fn bulk_failure(error: &crate::error::Error) -> &BulkWriteError {
    match *error.kind {
        ErrorKind::BulkWrite(ref failure) => failure,
        _ => panic!("expected bulk write error, got {:?}", error),
    }
}

#[tokio::test]
async fn eleven_inserts_in_two_batches() {
    let transport = MockTransport::with_responder(|command| reply_failing(command, &[]));
    let test = TestClient::with_transport(small_batches(), transport, ClientOptions::default());

    let result = test
        .client
        .collection("db", "coll")
        .bulk_write(eleven_inserts(), None)
        .await
        .unwrap();

    assert_eq!(result.inserted_count, 11);
    assert_eq!(result.inserted_ids.len(), 11);
    assert_eq!(result.inserted_ids.get(&10), Some(&Bson::Int32(10)));

    let commands = test.transport.commands();
    let sizes: Vec<usize> = commands
        .iter()
        .map(|(_, command)| statement_count(command))
        .collect();
    assert_eq!(sizes, vec![10, 1]);
    assert!(commands
        .iter()
        .all(|(_, command)| command.body.get_bool("ordered").ok() == Some(true)));
}

#[tokio::test]
async fn ordered_bulk_write_halts_after_failing_batch() {
    let transport = MockTransport::with_responder(|command| reply_failing(command, &[5]));
    let test = TestClient::with_transport(small_batches(), transport, ClientOptions::default());

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(eleven_inserts(), None)
        .await
        .unwrap_err();

    let failure = bulk_failure(&error);
    assert_eq!(
        failure
            .write_errors
            .iter()
            .map(|error| error.index)
            .collect::<Vec<_>>(),
        vec![5]
    );
    let partial = failure.partial_result.as_ref().unwrap();
    assert_eq!(partial.inserted_count, 5);
    assert_eq!(
        partial.inserted_ids.keys().copied().collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(test.transport.commands().len(), 1);
}

#[tokio::test]
async fn unordered_bulk_write_runs_every_batch() {
    let transport = MockTransport::with_responder(|command| reply_failing(command, &[0]));
    let test = TestClient::with_transport(small_batches(), transport, ClientOptions::default());

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(
            eleven_inserts(),
            BulkWriteOptions::builder().ordered(false).build(),
        )
        .await
        .unwrap_err();

    let failure = bulk_failure(&error);
    assert_eq!(
        failure
            .write_errors
            .iter()
            .map(|error| error.index)
            .collect::<Vec<_>>(),
        vec![0, 10]
    );
    let partial = failure.partial_result.as_ref().unwrap();
    assert_eq!(partial.inserted_count, 9);
    assert!(!partial.inserted_ids.contains_key(&0));
    assert!(!partial.inserted_ids.contains_key(&10));

    let commands = test.transport.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands
        .iter()
        .all(|(_, command)| command.body.get_bool("ordered").ok() == Some(false)));
}

#[tokio::test]
async fn upserted_ids_are_translated() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 2 }));
    test.transport.push_reply(Ok(doc! {
        "ok": 1,
        "n": 2,
        "nModified": 1,
        "upserted": [{ "index": 1, "_id": "upserted" }],
    }));

    let models = vec![
        WriteModel::insert_one(doc! { "_id": 0 }),
        WriteModel::insert_one(doc! { "_id": 1 }),
        WriteModel::update_one(doc! { "x": 1 }, doc! { "$set": { "y": 1 } }),
        WriteModel::UpdateOne(
            UpdateModel::builder()
                .filter(doc! { "x": 2 })
                .update(doc! { "$set": { "y": 2 } })
                .upsert(true)
                .build(),
        ),
    ];
    let result = test
        .client
        .collection("db", "coll")
        .bulk_write(models, None)
        .await
        .unwrap();

    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 1);
    assert_eq!(
        result.upserted_ids.into_iter().collect::<Vec<_>>(),
        vec![(3, Bson::String("upserted".into()))]
    );
}

#[tokio::test]
async fn write_concern_error_halts_ordered_bulk_write() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    test.transport.push_reply(Ok(doc! {
        "ok": 1,
        "n": 10,
        "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "waiting for replication timed out" },
    }));

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(eleven_inserts(), None)
        .await
        .unwrap_err();

    let failure = bulk_failure(&error);
    assert!(failure.write_errors.is_empty());
    assert_eq!(failure.write_concern_error.as_ref().map(|wc| wc.code), Some(64));
    assert_eq!(failure.partial_result.as_ref().map(|r| r.inserted_count), Some(10));
    assert_eq!(test.transport.commands().len(), 1);
}

#[tokio::test]
async fn write_concern_error_does_not_halt_unordered_bulk_write() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    test.transport.push_reply(Ok(doc! {
        "ok": 1,
        "n": 10,
        "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "waiting for replication timed out" },
    }));
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 1 }));

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(
            eleven_inserts(),
            BulkWriteOptions::builder().ordered(false).build(),
        )
        .await
        .unwrap_err();

    let failure = bulk_failure(&error);
    assert!(failure.write_concern_error.is_some());
    assert_eq!(failure.partial_result.as_ref().map(|r| r.inserted_count), Some(11));
    assert_eq!(test.transport.commands().len(), 2);
}

#[tokio::test]
async fn unsupported_collation_sends_nothing() {
    let old_server = replica_set([ServerDescription {
        max_wire_version: Some(4),
        ..server("a:27017", ServerType::RsPrimary)
    }]);
    let test = TestClient::new(old_server, ClientOptions::default());

    let models = vec![
        WriteModel::insert_one(doc! { "x": 1 }),
        WriteModel::DeleteOne(
            crate::bulk_write::DeleteModel::builder()
                .filter(doc! {})
                .collation(Collation::builder().locale("en").build())
                .build(),
        ),
    ];
    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(models, None)
        .await
        .unwrap_err();

    assert!(matches!(*error.kind, ErrorKind::IncompatibleServer { .. }));
    assert!(test.transport.commands().is_empty());
}

#[tokio::test]
async fn empty_bulk_write_is_rejected() {
    let test = TestClient::new(small_batches(), ClientOptions::default());

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(Vec::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
    assert!(test.transport.commands().is_empty());
}

fn twenty_one_inserts() -> Vec<WriteModel> {
    (0..21)
        .map(|i| WriteModel::insert_one(doc! { "_id": i }))
        .collect()
}

#[tokio::test]
async fn failed_first_batch_is_reported_as_is() {
    let options = ClientOptions::builder().max_write_attempts(1).build();
    let test = TestClient::new(small_batches(), options);
    test.transport.push_reply(Err(network_error()));

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(eleven_inserts(), None)
        .await
        .unwrap_err();

    assert!(error.is_network_error());
    assert_eq!(test.transport.commands().len(), 1);
}

#[tokio::test]
async fn unordered_bulk_write_continues_after_failed_batch() {
    let options = ClientOptions::builder().max_write_attempts(1).build();
    let test = TestClient::new(small_batches(), options);
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 10 }));
    test.transport.push_reply(Err(network_error()));
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 1 }));

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(
            twenty_one_inserts(),
            BulkWriteOptions::builder().ordered(false).build(),
        )
        .await
        .unwrap_err();

    assert_eq!(test.transport.commands().len(), 3);

    let failure = bulk_failure(&error);
    assert!(failure.write_errors.is_empty());
    assert_eq!(failure.batch_errors.len(), 1);
    assert_eq!(failure.batch_errors[0].start_index, 10);
    assert_eq!(failure.batch_errors[0].len, 10);
    assert!(failure.batch_errors[0].error.is_network_error());

    let partial = failure.partial_result.as_ref().unwrap();
    assert_eq!(partial.inserted_count, 11);
    let mut expected_ids: Vec<usize> = (0..10).collect();
    expected_ids.push(20);
    assert_eq!(
        partial.inserted_ids.keys().copied().collect::<Vec<_>>(),
        expected_ids
    );
}

#[tokio::test]
async fn ordered_bulk_write_keeps_results_of_earlier_batches() {
    let options = ClientOptions::builder().max_write_attempts(1).build();
    let test = TestClient::new(small_batches(), options);
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 10 }));
    test.transport.push_reply(Err(network_error()));

    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(twenty_one_inserts(), None)
        .await
        .unwrap_err();

    assert_eq!(test.transport.commands().len(), 2);

    let failure = bulk_failure(&error);
    assert_eq!(failure.batch_errors.len(), 1);
    assert_eq!(failure.batch_errors[0].start_index, 10);
    assert_eq!(failure.partial_result.as_ref().map(|r| r.inserted_count), Some(10));
}

fn applied_with_failures() -> Document {
    doc! {
        "ok": 1,
        "n": 1,
        "writeErrors": [{ "index": 0, "code": 11000, "codeName": "DuplicateKey", "errmsg": "E11000 duplicate key error" }],
        "writeConcernError": {
            "code": 91,
            "codeName": "ShutdownInProgress",
            "errmsg": "shutdown in progress",
            "errorLabels": [RETRYABLE_WRITE_ERROR],
        },
    }
}

#[tokio::test]
async fn batch_reporting_applied_writes_is_not_sent_again() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    test.transport.push_reply(Ok(applied_with_failures()));
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 2 }));

    let models = vec![
        WriteModel::insert_one(doc! { "_id": 0 }),
        WriteModel::insert_one(doc! { "_id": 1 }),
    ];
    let error = test
        .client
        .collection("db", "coll")
        .bulk_write(models, BulkWriteOptions::builder().ordered(false).build())
        .await
        .unwrap_err();

    assert_eq!(test.transport.commands().len(), 1);
    assert_eq!(test.topology.rescans(), 0);

    let failure = bulk_failure(&error);
    assert_eq!(
        failure
            .write_errors
            .iter()
            .map(|error| error.code)
            .collect::<Vec<_>>(),
        vec![11000]
    );
    assert_eq!(failure.write_concern_error.as_ref().map(|wc| wc.code), Some(91));
}

#[tokio::test]
async fn batch_reporting_applied_writes_keeps_its_txn_number() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    let mut session = test.client.start_session(None);
    test.transport.push_reply(Ok(applied_with_failures()));
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 2 }));

    let models = vec![
        WriteModel::insert_one(doc! { "_id": 0 }),
        WriteModel::insert_one(doc! { "_id": 1 }),
    ];
    let error = test
        .client
        .collection("db", "coll")
        .bulk_write_with_session(
            models,
            BulkWriteOptions::builder().ordered(false).build(),
            &mut session,
        )
        .await
        .unwrap_err();

    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    assert_eq!(bulk_failure(&error).write_errors.len(), 1);
    assert_eq!(test.transport.commands().len(), 1);
    assert_eq!(session.txn_number(), 1);
}

#[tokio::test]
async fn insert_many_reports_generated_ids() {
    let test = TestClient::new(small_batches(), ClientOptions::default());
    test.transport.push_reply(Ok(doc! { "ok": 1, "n": 2 }));

    let result = test
        .client
        .collection("db", "coll")
        .insert_many(
            vec![doc! { "x": 1 }, doc! { "_id": "mine", "x": 2 }],
            InsertManyOptions::builder().ordered(true).build(),
        )
        .await
        .unwrap();

    assert_eq!(result.inserted_ids.len(), 2);
    assert_eq!(
        result.inserted_ids.get(&1),
        Some(&Bson::String("mine".into()))
    );

    let body = &test.transport.command_bodies()[0];
    let documents = body.get_array("documents").unwrap();
    let first = documents[0].as_document().unwrap();
    assert_eq!(first.get("_id"), result.inserted_ids.get(&0));
}

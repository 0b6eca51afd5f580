use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse},
    error::{ErrorKind, RETRYABLE_WRITE_ERROR},
    options::ServerAddress,
};

fn response(body: crate::bson::Document) -> RawCommandResponse {
    RawCommandResponse::new(ServerAddress::default(), body)
}

#[test]
fn success_accepts_any_numeric_one() {
    assert!(response(doc! { "ok": 1 }).validate().is_ok());
    assert!(response(doc! { "ok": 1.0 }).validate().is_ok());
    assert!(response(doc! { "ok": 1_i64 }).validate().is_ok());
    assert!(response(doc! { "n": 1 }).validate().is_err());
}

#[test]
fn failure_carries_code_and_labels() {
    let error = response(doc! {
        "ok": 0,
        "code": 91,
        "codeName": "ShutdownInProgress",
        "errmsg": "shutdown in progress",
        "errorLabels": [RETRYABLE_WRITE_ERROR],
    })
    .validate()
    .unwrap_err();

    assert_eq!(error.code(), Some(91));
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    match *error.kind {
        ErrorKind::Command(ref command_error) => {
            assert_eq!(command_error.code_name, "ShutdownInProgress");
            assert_eq!(command_error.message, "shutdown in progress");
        }
        ref other => panic!("expected command error, got {:?}", other),
    }
}

#[test]
fn failure_without_code_is_invalid_response() {
    let error = response(doc! { "ok": 0, "errmsg": "oops" }).validate().unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidResponse { .. }));
}

#[test]
fn command_fields() {
    let mut command = Command::new("insert", "db", doc! { "insert": "coll" });
    assert_eq!(command.txn_number(), None);

    command.set_session(&doc! { "id": 1 });
    command.set_txn_number(7);
    command.set_start_transaction();
    command.set_autocommit();

    assert_eq!(command.txn_number(), Some(7));
    assert_eq!(
        command.body,
        doc! {
            "insert": "coll",
            "lsid": { "id": 1 },
            "txnNumber": 7_i64,
            "startTransaction": true,
            "autocommit": false,
        }
    );
}

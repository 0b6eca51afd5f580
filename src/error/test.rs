use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    error::{
        convert_bulk_errors,
        BulkWriteError,
        CommandError,
        Error,
        ErrorKind,
        IndexedWriteError,
        RetryableCodeTable,
        WriteConcernError,
        WriteFailure,
        RETRYABLE_WRITE_ERROR,
    },
    results::BulkWriteResult,
};

fn command_error(code: i32, message: &str) -> Error {
    ErrorKind::Command(CommandError {
        code,
        code_name: String::new(),
        message: message.to_string(),
    })
    .into()
}

fn write_concern_error(code: i32, labels: Vec<String>) -> WriteConcernError {
    WriteConcernError {
        code,
        code_name: "WriteConcernFailed".to_string(),
        message: "waiting for replication timed out".to_string(),
        details: None,
        labels,
    }
}

#[test]
fn network_errors_are_always_retryable() {
    let error: Error = ErrorKind::from(std::io::ErrorKind::ConnectionReset).into();

    assert!(error.is_network_error());
    assert!(error.is_read_retryable(Some(17)));
    assert!(error.is_legacy_write_retryable(Some(17)));
    assert!(error.should_add_retryable_write_label(Some(17)));
    assert!(error.should_add_retryable_write_label(Some(5)));
}

#[test]
fn state_change_codes() {
    assert!(command_error(10107, "").is_not_primary());
    assert!(command_error(1, "not master").is_not_primary());
    assert!(command_error(1, "not primary").is_not_primary());
    assert!(!command_error(1, "not master or secondary").is_not_primary());

    assert!(command_error(1, "not master or secondary").is_recovering());
    assert!(command_error(1, "node is recovering").is_recovering());
    assert!(command_error(11602, "").is_recovering());

    assert!(command_error(13436, "").is_state_change_error());
    assert!(!command_error(2, "bad value").is_state_change_error());
}

#[test]
fn read_retryability_uses_versioned_table() {
    // ReadConcernMajorityNotAvailableYet only became retryable for 4.4+ servers.
    let error = command_error(134, "read concern majority not available yet");
    assert!(!error.is_read_retryable(Some(8)));
    assert!(error.is_read_retryable(Some(9)));
    assert!(error.is_read_retryable(Some(21)));

    assert!(command_error(189, "").is_read_retryable(None));
    assert!(!command_error(2, "bad value").is_read_retryable(Some(21)));
}

#[test]
fn code_table_selection() {
    assert_eq!(RetryableCodeTable::for_wire_version(None).min_wire_version, 0);
    assert_eq!(RetryableCodeTable::for_wire_version(Some(6)).min_wire_version, 0);
    assert_eq!(RetryableCodeTable::for_wire_version(Some(9)).min_wire_version, 9);
    assert_eq!(RetryableCodeTable::for_wire_version(Some(25)).min_wire_version, 9);
}

#[test]
fn retryable_write_label() {
    let error = command_error(91, "shutdown in progress");

    // Pre-4.4 servers don't label errors themselves.
    assert!(error.should_add_retryable_write_label(Some(8)));
    assert!(!error.should_add_retryable_write_label(Some(9)));

    assert!(!error.is_write_retryable());

    let mut labeled = error;
    labeled.add_label(RETRYABLE_WRITE_ERROR);
    assert!(labeled.is_write_retryable());
}

#[test]
fn legacy_write_retryability() {
    assert!(command_error(262, "").is_legacy_write_retryable(Some(6)));
    assert!(command_error(1, "not master").is_legacy_write_retryable(Some(6)));
    assert!(command_error(1, "node is recovering").is_legacy_write_retryable(None));
    assert!(!command_error(11000, "duplicate key").is_legacy_write_retryable(Some(6)));
}

#[test]
fn per_item_write_errors_are_never_retryable() {
    let error: Error = ErrorKind::BulkWrite(BulkWriteError {
        write_errors: vec![IndexedWriteError {
            index: 0,
            code: 91,
            code_name: None,
            message: "shutdown in progress".to_string(),
            details: None,
        }],
        write_concern_error: None,
        ..Default::default()
    })
    .into();

    assert!(!error.is_read_retryable(Some(6)));
    assert!(!error.is_legacy_write_retryable(Some(6)));
    assert!(!error.should_add_retryable_write_label(Some(6)));
    assert!(error.is_write_outcome());
}

#[test]
fn write_concern_errors_are_terminal() {
    let error: Error = ErrorKind::Write(WriteFailure::WriteConcernError(write_concern_error(
        91,
        vec![RETRYABLE_WRITE_ERROR.to_string()],
    )))
    .into();

    // The labels are lifted onto the error, but the write was applied and isn't sent again.
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    assert_eq!(error.code(), Some(91));
    assert!(!error.is_write_retryable());
    assert!(!error.is_legacy_write_retryable(Some(6)));
    assert!(!error.should_add_retryable_write_label(Some(6)));
    assert!(!error.is_state_change_error());

    let in_batch: Error = ErrorKind::BulkWrite(BulkWriteError {
        write_concern_error: Some(write_concern_error(91, Vec::new())),
        ..Default::default()
    })
    .into();
    assert!(!in_batch.is_legacy_write_retryable(Some(6)));
    assert!(!in_batch.is_read_retryable(Some(6)));
}

#[test]
fn convert_bulk_error_to_write_error() {
    let mut bulk: Error = ErrorKind::BulkWrite(BulkWriteError {
        write_errors: vec![IndexedWriteError {
            index: 0,
            code: 11000,
            code_name: Some("DuplicateKey".to_string()),
            message: "duplicate key".to_string(),
            details: Some(doc! { "key": 1 }),
        }],
        write_concern_error: None,
        partial_result: Some(BulkWriteResult::default()),
        ..Default::default()
    })
    .into();

    bulk.add_label("SomeLabel");
    let converted = convert_bulk_errors(bulk);
    match *converted.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) => {
            assert_eq!(write_error.code, 11000);
            assert_eq!(write_error.details, Some(doc! { "key": 1 }));
        }
        ref other => panic!("expected write error, got {:?}", other),
    }
    assert!(converted.contains_label("SomeLabel"));

    let wc_only: Error = ErrorKind::BulkWrite(BulkWriteError {
        write_concern_error: Some(write_concern_error(64, Vec::new())),
        ..Default::default()
    })
    .into();
    assert!(matches!(
        *convert_bulk_errors(wc_only).kind,
        ErrorKind::Write(WriteFailure::WriteConcernError(_))
    ));

    let untouched = convert_bulk_errors(command_error(2, "bad value"));
    assert_eq!(untouched.code(), Some(2));
}

#[test]
fn merge_batch_translates_indices() {
    let mut cumulative = BulkWriteError::default();
    let batch_error = |index| BulkWriteError {
        write_errors: vec![IndexedWriteError {
            index,
            code: 11000,
            code_name: None,
            message: "duplicate key".to_string(),
            details: None,
        }],
        write_concern_error: None,
        batch_errors: Vec::new(),
        partial_result: Some(BulkWriteResult {
            inserted_count: 1,
            ..Default::default()
        }),
    };

    cumulative.merge_batch(batch_error(2), 0);
    cumulative.merge_batch(batch_error(0), 10);

    let indices: Vec<usize> = cumulative.write_errors.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![2, 10]);
    assert_eq!(cumulative.partial_result.map(|r| r.inserted_count), Some(2));
}

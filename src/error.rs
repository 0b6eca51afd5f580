//! Contains the `Error` and `Result` types that `mongodb_dispatch` uses.

mod bulk_write;
#[cfg(test)]
mod test;

use std::{collections::HashSet, fmt, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::bson::Document;

pub use bulk_write::{BatchError, BulkWriteError, IndexedWriteError};

const RECOVERING_CODES: [i32; 5] = [11600, 11602, 13436, 189, 91];
const NOT_PRIMARY_CODES: [i32; 3] = [10107, 13435, 10058];

/// The wire version of MongoDB 4.4, the first release that labels retryable write errors itself.
const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// Retryable error codes in effect for servers whose max wire version is at least
/// `min_wire_version`. Tables are ordered by ascending wire version; the last applicable one wins.
#[derive(Debug)]
pub(crate) struct RetryableCodeTable {
    pub(crate) min_wire_version: i32,
    pub(crate) read_codes: &'static [i32],
    pub(crate) write_codes: &'static [i32],
}

pub(crate) const RETRYABLE_CODE_TABLES: &[RetryableCodeTable] = &[
    RetryableCodeTable {
        min_wire_version: 0,
        read_codes: &[11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001],
        write_codes: &[11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 262],
    },
    RetryableCodeTable {
        min_wire_version: SERVER_4_4_0_WIRE_VERSION,
        read_codes: &[
            11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 134, 262,
        ],
        write_codes: &[11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 262],
    },
];

impl RetryableCodeTable {
    /// Picks the table for a server reporting the given max wire version. Servers whose version is
    /// not known use the oldest table.
    pub(crate) fn for_wire_version(max_wire_version: Option<i32>) -> &'static RetryableCodeTable {
        let version = max_wire_version.unwrap_or(0);
        RETRYABLE_CODE_TABLES
            .iter()
            .rev()
            .find(|table| table.min_wire_version <= version)
            .unwrap_or(&RETRYABLE_CODE_TABLES[0])
    }
}

/// Retryable write error label. This label will be added to an error when the error is
/// write-retryable.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// Transient transaction error label. This label will be added to a network error or server
/// selection error that occurs during a transaction.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Unknown transaction commit result error label. This label will be added to a server selection
/// error, network error, write-retryable error, MaxTimeMSExpired error, or write concern
/// failed/timeout during a commitTransaction.
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

/// The result type for all methods that can return an error in the `mongodb_dispatch` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `mongodb_dispatch` crate. The inner [`ErrorKind`] is boxed so
/// that the error stays small when passed around in `Result`s.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
    labels: HashSet<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let Some(wc) = kind.get_write_concern_error() {
            labels.extend(wc.labels.clone());
        }
        Self {
            kind: Box::new(kind),
            labels,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn incompatible_server(message: impl Into<String>) -> Self {
        ErrorKind::IncompatibleServer {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn server_selection(message: impl Into<String>) -> Self {
        ErrorKind::ServerSelection {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn transaction(message: impl Into<String>) -> Self {
        ErrorKind::Transaction {
            message: message.into(),
        }
        .into()
    }

    /// Whether this error is a network error, i.e. the attempt failed to send a command or to
    /// receive its reply.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.kind.as_ref(),
            ErrorKind::Io(..) | ErrorKind::ConnectionPoolCleared { .. }
        )
    }

    /// Whether a read operation should be retried if this error occurs against a server reporting
    /// the given max wire version.
    pub(crate) fn is_read_retryable(&self, max_wire_version: Option<i32>) -> bool {
        if self.is_network_error() {
            return true;
        }
        match self.sdam_code_and_message() {
            Some((code, _)) => {
                RetryableCodeTable::for_wire_version(max_wire_version)
                    .read_codes
                    .contains(&code)
                    || self.is_state_change_error()
            }
            None => false,
        }
    }

    /// Whether a write should be retried on the path that uses transaction numbers. The transport
    /// or the server marks such errors with the [`RETRYABLE_WRITE_ERROR`] label.
    pub(crate) fn is_write_retryable(&self) -> bool {
        self.contains_label(RETRYABLE_WRITE_ERROR) && !self.is_write_outcome()
    }

    /// Whether a write should be retried on the path without transaction numbers: network errors
    /// and the transient "not primary" and "node is recovering" failures.
    pub(crate) fn is_legacy_write_retryable(&self, max_wire_version: Option<i32>) -> bool {
        if self.is_network_error() {
            return true;
        }
        match self.sdam_code_and_message() {
            Some((code, _)) => {
                RetryableCodeTable::for_wire_version(max_wire_version)
                    .write_codes
                    .contains(&code)
                    || self.is_state_change_error()
            }
            None => false,
        }
    }

    /// Whether this error reports the outcome of writes the server applied, i.e. per-item write
    /// errors or a write concern error. Such replies are never retried.
    pub(crate) fn is_write_outcome(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::BulkWrite(_) | ErrorKind::Write(_))
    }

    /// Whether a "RetryableWriteError" label should be added to this error. If max_wire_version
    /// indicates a 4.4+ server, a label should only be added if the error is a network error.
    /// Otherwise, a label should be added if the error is a network error or the error code
    /// matches one of the retryable write codes.
    pub(crate) fn should_add_retryable_write_label(&self, max_wire_version: Option<i32>) -> bool {
        if self.is_network_error() {
            return true;
        }
        if max_wire_version.is_some_and(|version| version >= SERVER_4_4_0_WIRE_VERSION) {
            return false;
        }
        match self.sdam_code_and_message() {
            Some((code, _)) => RetryableCodeTable::for_wire_version(max_wire_version)
                .write_codes
                .contains(&code),
            None => false,
        }
    }

    /// If this error corresponds to a "not primary" error reported by the server.
    pub(crate) fn is_not_primary(&self) -> bool {
        self.sdam_code_and_message()
            .map(|(code, msg)| is_not_primary(code, msg))
            .unwrap_or(false)
    }

    /// If this error corresponds to a "node is recovering" error reported by the server.
    pub(crate) fn is_recovering(&self) -> bool {
        self.sdam_code_and_message()
            .map(|(code, msg)| is_recovering(code, msg))
            .unwrap_or(false)
    }

    /// Whether the error reports that the server is no longer primary or is recovering.
    pub(crate) fn is_state_change_error(&self) -> bool {
        self.is_recovering() || self.is_not_primary()
    }

    /// Gets the code from this error, if applicable. Write errors and write concern errors report
    /// their own code.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => Some(command_error.code),
            ErrorKind::BulkWrite(BulkWriteError {
                write_concern_error: Some(wc_error),
                ..
            }) => Some(wc_error.code),
            ErrorKind::Write(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Gets the code and message used to classify this error for retries. Only failed commands
    /// are classified; write errors and write concern errors report writes that were applied.
    fn sdam_code_and_message(&self) -> Option<(i32, &str)> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => {
                Some((command_error.code, command_error.message.as_str()))
            }
            _ => None,
        }
    }

    /// Returns the labels for this error.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error contains the specified label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels.contains(label.as_ref())
    }

    /// Adds the given label to this error.
    pub(crate) fn add_label<T: AsRef<str>>(&mut self, label: T) {
        self.labels.insert(label.as_ref().to_string());
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Error::new(err.into(), None::<Option<String>>)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(err: std::io::ErrorKind) -> Self {
        Self::Io(Arc::new(err.into()))
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(#[from] crate::bson::de::Error),

    /// Wrapper around `bson::ser::Error`.
    #[error("{0}")]
    BsonSerialization(#[from] crate::bson::ser::Error),

    /// An error occurred when trying to execute a write operation consisting of multiple writes.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    BulkWrite(BulkWriteError),

    /// The server returned an error to an attempted operation.
    #[error("Command failed: {0}")]
    Command(CommandError),

    /// The server the operation was routed to does not support a feature the operation requires.
    #[error("The server does not support a feature required by the operation: {message}")]
    #[non_exhaustive]
    IncompatibleServer { message: String },

    /// An internal error occurred.
    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },

    /// The server returned an invalid reply to a database operation.
    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// Wrapper around [`std::io::Error`].
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The connection pool for a server was cleared during operation execution due to
    /// a concurrent error, causing the operation to fail.
    #[error("{message}")]
    #[non_exhaustive]
    ConnectionPoolCleared { message: String },

    /// The client was not able to select a server for the operation.
    #[error("{message}")]
    #[non_exhaustive]
    ServerSelection { message: String },

    /// An error occurred during a transaction, or a transaction command was used incorrectly.
    #[error("{message}")]
    #[non_exhaustive]
    Transaction { message: String },

    /// An error occurred when trying to execute a single write operation.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    Write(WriteFailure),
}

impl ErrorKind {
    fn get_write_concern_error(&self) -> Option<&WriteConcernError> {
        match self {
            ErrorKind::BulkWrite(BulkWriteError {
                write_concern_error,
                ..
            }) => write_concern_error.as_ref(),
            ErrorKind::Write(WriteFailure::WriteConcernError(err)) => Some(err),
            _ => None,
        }
    }
}

fn is_not_primary(code: i32, message: &str) -> bool {
    if NOT_PRIMARY_CODES.contains(&code) {
        return true;
    } else if is_recovering(code, message) {
        return false;
    }
    message.contains("not master") || message.contains("not primary")
}

fn is_recovering(code: i32, message: &str) -> bool {
    if RECOVERING_CODES.contains(&code) {
        return true;
    }
    message.contains("not master or secondary")
        || message.contains("not primary or secondary")
        || message.contains("node is recovering")
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "({}): {}", self.code_name, self.message)
    }
}

/// An error that occurred due to not being able to satisfy a write concern.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(alias = "errmsg", default)]
    pub message: String,

    /// A document identifying the write concern setting related to the error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,

    /// The error labels that the server returned.
    #[serde(rename = "errorLabels", default)]
    pub labels: Vec<String>,
}

/// An error that occurred during a single write that wasn't due to being unable to satisfy a
/// write concern.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct WriteError {
    /// Identifies the type of write error.
    pub code: i32,

    /// The name associated with the error code.
    ///
    /// Note that the server will not return this in some cases, hence `code_name` being an
    /// `Option`.
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    pub message: String,

    /// A document providing more information about the write error (e.g. details
    /// pertaining to document validation).
    pub details: Option<Document>,
}

/// An error that occurred when trying to execute a single write operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum WriteFailure {
    /// An error that occurred due to not being able to satisfy a write concern.
    WriteConcernError(WriteConcernError),

    /// An error that occurred during a write operation that wasn't due to being unable to satisfy a
    /// write concern.
    WriteError(WriteError),
}

impl WriteFailure {
    fn code(&self) -> i32 {
        match self {
            Self::WriteConcernError(e) => e.code,
            Self::WriteError(e) => e.code,
        }
    }

    fn from_bulk_failure(bulk: BulkWriteError) -> Result<Self> {
        if let Some(bulk_write_error) = bulk.write_errors.into_iter().next() {
            let write_error = WriteError {
                code: bulk_write_error.code,
                code_name: bulk_write_error.code_name,
                message: bulk_write_error.message,
                details: bulk_write_error.details,
            };
            Ok(WriteFailure::WriteError(write_error))
        } else if let Some(wc_error) = bulk.write_concern_error {
            Ok(WriteFailure::WriteConcernError(wc_error))
        } else if let Some(batch_error) = bulk.batch_errors.into_iter().next() {
            Err(batch_error.error)
        } else {
            Err(Error::invalid_response(
                "error missing write errors and write concern errors",
            ))
        }
    }
}

/// Translates ErrorKind::BulkWrite cases to ErrorKind::Write, leaving all other errors untouched.
pub(crate) fn convert_bulk_errors(error: Error) -> Error {
    let Error { kind, labels } = error;
    match *kind {
        ErrorKind::BulkWrite(bulk_failure) => match WriteFailure::from_bulk_failure(bulk_failure) {
            Ok(failure) => Error::new(ErrorKind::Write(failure), Some(labels)),
            Err(e) => e,
        },
        kind => Error {
            kind: Box::new(kind),
            labels,
        },
    }
}

mod abort_transaction;
pub(crate) mod bulk_write;
mod commit_transaction;
mod find;
mod run_command;

#[cfg(test)]
mod test;

use serde::{Deserialize, Serialize};

use crate::{
    bson::{Bson, Document},
    cmap::{Command, RawCommandResponse},
    concern::WriteConcern,
    error::{Error, ErrorKind, IndexedWriteError, Result, WriteConcernError, WriteFailure},
    sdam::ServerDescription,
    selection_criteria::SelectionCriteria,
};

pub(crate) use abort_transaction::AbortTransaction;
pub(crate) use bulk_write::WriteBatch;
pub(crate) use commit_transaction::CommitTransaction;
pub(crate) use find::Find;
pub(crate) use run_command::RunCommand;

/// Room left in a wire message for the command envelope around a batch of write statements.
pub(crate) const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// A trait modeling the behavior of a server side operation. The defaults describe a plain command
/// that is run once against the primary.
pub(crate) trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    /// The operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &ServerDescription) -> Result<Command>;

    /// Interprets the server response to the command. The response has already been checked for
    /// `ok: 0`.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &ServerDescription,
    ) -> Result<Self::O>;

    /// Criteria to use for selecting the server that this operation will be executed on.
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        None
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// Whether this operation supports sessions or not.
    fn supports_sessions(&self) -> bool {
        true
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Whether every statement of this write may be retried under a transaction number. Writes
    /// that affect several documents per statement can't be, and fall back to the path without
    /// transaction numbers.
    fn supports_transaction_numbers(&self) -> bool {
        true
    }

    /// Whether this operation is only meaningful within an explicit session.
    fn requires_session(&self) -> bool {
        false
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    fn name(&self) -> &str {
        Self::NAME
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    Read,
    None,
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to a
/// Document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize>(doc: &mut Document, options: Option<&T>) -> Result<()> {
    if let Some(options) = options {
        match crate::bson::to_bson(options)? {
            Bson::Document(options_doc) => doc.extend(options_doc),
            _ => {
                return Err(Error::internal(
                    "options did not serialize to a document",
                ))
            }
        }
    }
    Ok(())
}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error.clone())),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

/// The reply to an insert, update or delete command.
#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponseBody {
    #[serde(default)]
    pub(crate) n: u64,

    #[serde(rename = "nModified", default)]
    pub(crate) n_modified: u64,

    #[serde(default)]
    pub(crate) upserted: Vec<UpsertedId>,

    #[serde(rename = "writeErrors", default)]
    pub(crate) write_errors: Vec<IndexedWriteError>,

    #[serde(rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    pub(crate) labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpsertedId {
    pub(crate) index: usize,

    #[serde(rename = "_id")]
    pub(crate) id: Bson,
}

use serde::Deserialize;

use crate::{
    bson::Document,
    error::{Error, WriteConcernError},
    results::BulkWriteResult,
};

/// An error that occurred while executing one of the writes in a bulk write.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct IndexedWriteError {
    /// Index into the caller's list of write models that this error corresponds to.
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// The name associated with the error code.
    ///
    /// Note that the server will not return this in some cases, hence `code_name` being an
    /// `Option`.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,

    /// A document providing more information about the write error (e.g. details
    /// pertaining to document validation).
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// The errors that occurred while executing a bulk write, along with the results of the writes
/// that did succeed.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BulkWriteError {
    /// The per-item failures, ordered by their index into the caller's list of write models.
    pub write_errors: Vec<IndexedWriteError>,

    /// The error that occurred on account of write concern failure.
    pub write_concern_error: Option<WriteConcernError>,

    /// The batches that failed as a whole, for instance because their command could not be sent.
    /// Whether the writes of such a batch were applied is unknown.
    pub batch_errors: Vec<BatchError>,

    /// The results of the writes that were applied before or alongside the failures.
    pub partial_result: Option<BulkWriteResult>,
}

/// A batch of a bulk write whose command failed without the server reporting on its writes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct BatchError {
    /// Index into the caller's list of write models of the first write of the batch.
    pub start_index: usize,

    /// The number of writes in the batch.
    pub len: usize,

    /// The error the batch failed with.
    pub error: Error,
}

impl BulkWriteError {
    /// Folds the failure of one batch into this one. `offset` is the position of the batch's first
    /// write in the caller's list, which the batch-local indices reported by the server are
    /// relative to.
    pub(crate) fn merge_batch(&mut self, other: BulkWriteError, offset: usize) {
        self.write_errors
            .extend(other.write_errors.into_iter().map(|error| IndexedWriteError {
                index: offset + error.index,
                ..error
            }));
        if other.write_concern_error.is_some() {
            self.write_concern_error = other.write_concern_error;
        }
        if let Some(other_partial_result) = other.partial_result {
            self.merge_partial_result(other_partial_result, offset);
        }
    }

    /// Whether any write, write concern or batch failure was recorded.
    pub(crate) fn has_failures(&self) -> bool {
        !self.write_errors.is_empty()
            || self.write_concern_error.is_some()
            || !self.batch_errors.is_empty()
    }

    pub(crate) fn merge_partial_result(&mut self, other: BulkWriteResult, offset: usize) {
        self.partial_result
            .get_or_insert_with(Default::default)
            .merge_batch(other, offset);
    }
}

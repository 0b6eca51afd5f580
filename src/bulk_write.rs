//! Contains the write models accepted by [`Collection::bulk_write`](crate::Collection::bulk_write)
//! and the planner that splits a list of them into batches a server accepts.

mod models;
mod plan;

pub use models::{DeleteModel, ReplaceOneModel, UpdateModel, WriteKind, WriteModel};
pub use plan::{plan, plan_with_estimator, Batch};
pub(crate) use plan::{check_capabilities, check_statement_size};

use std::collections::HashSet;

use crate::{
    error::{BatchError, BulkWriteError, Error, ErrorKind, Result},
    operation::WriteBatch,
    options::{BulkWriteOptions, ReadPreference, SelectionCriteria},
    results::BulkWriteResult,
    trace::{TracingRepresentation, BULK_WRITE_TRACING_EVENT_TARGET},
    Client,
    ClientSession,
    Namespace,
};

impl Client {
    /// Plans `models` against the current primary and sends the batches one after the other.
    ///
    /// Results and failures of the batches are folded together with their indices translated back
    /// to positions in `models`. An ordered bulk write stops after the first batch that fails,
    /// whether the server reported failed writes or a write concern error, or the command itself
    /// failed. An unordered one sends every batch and reports all failures together.
    pub(crate) async fn execute_bulk_write(
        &self,
        ns: Namespace,
        mut models: Vec<WriteModel>,
        options: BulkWriteOptions,
        mut session: Option<&mut ClientSession>,
    ) -> Result<BulkWriteResult> {
        if models.is_empty() {
            return Err(Error::invalid_argument(
                "a bulk write must contain at least one write",
            ));
        }
        for model in models.iter_mut() {
            model.validate()?;
            model.get_or_assign_id();
        }

        let primary = SelectionCriteria::ReadPreference(ReadPreference::Primary);
        let server = self.select_server(&primary, "bulkWrite", &[]).await?;
        let batches = plan(&models, &server)?;

        let ordered = options.ordered != Some(false);
        let batch_count = batches.len();
        tracing::debug!(
            target: BULK_WRITE_TRACING_EVENT_TARGET,
            namespace = %ns,
            writes = models.len(),
            batches = batch_count,
            ordered,
            "Bulk write planned"
        );

        let mut result = BulkWriteResult::default();
        let mut failure = BulkWriteError::default();
        let mut labels: HashSet<String> = HashSet::new();
        let mut answered_batches = 0;

        for (position, batch) in batches.into_iter().enumerate() {
            let Batch {
                kind,
                start_index,
                statements,
            } = batch;
            let len = statements.len();
            tracing::debug!(
                target: BULK_WRITE_TRACING_EVENT_TARGET,
                namespace = %ns,
                command = kind.command_name(),
                startIndex = start_index,
                writes = len,
                "Dispatching batch"
            );

            let op = WriteBatch::new(ns.clone(), kind, statements, options.clone());
            match self.execute_operation(op, session.as_deref_mut()).await {
                Ok(batch_result) => {
                    answered_batches += 1;
                    result.merge_batch(batch_result, start_index);
                    continue;
                }
                Err(error) => {
                    labels.extend(error.labels().iter().cloned());
                    let batch_failure = match *error.kind {
                        ErrorKind::BulkWrite(ref batch_failure) => Some(batch_failure.clone()),
                        _ => None,
                    };
                    match batch_failure {
                        Some(mut batch_failure) => {
                            answered_batches += 1;
                            if let Some(partial_result) = batch_failure.partial_result.take() {
                                result.merge_batch(partial_result, start_index);
                            }
                            failure.merge_batch(batch_failure, start_index);
                        }
                        None => {
                            tracing::debug!(
                                target: BULK_WRITE_TRACING_EVENT_TARGET,
                                namespace = %ns,
                                startIndex = start_index,
                                failure = error.tracing_representation(),
                                "Batch failed"
                            );
                            failure.batch_errors.push(BatchError {
                                start_index,
                                len,
                                error,
                            });
                        }
                    }
                }
            }

            if ordered && position + 1 < batch_count {
                tracing::debug!(
                    target: BULK_WRITE_TRACING_EVENT_TARGET,
                    namespace = %ns,
                    startIndex = start_index,
                    skippedBatches = batch_count - position - 1,
                    "Ordered bulk write halted"
                );
                break;
            }
        }

        if !failure.has_failures() {
            return Ok(result);
        }

        // A failed command is reported as-is when no batch got an answer from the server.
        if answered_batches == 0 && failure.batch_errors.len() == 1 {
            if let Some(batch_error) = failure.batch_errors.pop() {
                return Err(batch_error.error);
            }
        }

        failure.partial_result = Some(result);
        Err(Error::new(ErrorKind::BulkWrite(failure), Some(labels)))
    }
}

use std::collections::BTreeMap;

use crate::{
    bson::{Bson, Document},
    bson_util::doc_size_bytes,
    bulk_write::{check_capabilities, check_statement_size, WriteKind},
    cmap::{Command, RawCommandResponse},
    concern::WriteConcern,
    error::{BulkWriteError, Error, ErrorKind, IndexedWriteError, Result},
    operation::{append_options, Operation, Retryability, WriteResponseBody},
    options::BulkWriteOptions,
    results::BulkWriteResult,
    sdam::ServerDescription,
    Namespace,
};

/// One insert, update or delete command carrying a batch of statements of the same kind.
///
/// The result and error it reports use indices local to the batch.
#[derive(Debug)]
pub(crate) struct WriteBatch {
    ns: Namespace,
    kind: WriteKind,
    statements: Vec<Document>,
    options: BulkWriteOptions,
}

impl WriteBatch {
    pub(crate) fn new(
        ns: Namespace,
        kind: WriteKind,
        statements: Vec<Document>,
        options: BulkWriteOptions,
    ) -> Self {
        let mut options = options;
        if options.ordered.is_none() {
            options.ordered = Some(true);
        }
        if options
            .write_concern
            .as_ref()
            .is_some_and(WriteConcern::is_empty)
        {
            options.write_concern = None;
        }

        Self {
            ns,
            kind,
            statements,
            options,
        }
    }

    fn is_ordered(&self) -> bool {
        self.options.ordered != Some(false)
    }

    /// The `_id`s of the documents this insert batch managed to insert. Ordered inserts stop at the
    /// first failure; unordered ones skip each failing document.
    fn inserted_ids(&self, write_errors: &[IndexedWriteError]) -> BTreeMap<usize, Bson> {
        let attempted = if self.is_ordered() {
            write_errors
                .iter()
                .map(|error| error.index)
                .min()
                .unwrap_or(self.statements.len())
        } else {
            self.statements.len()
        };

        self.statements
            .iter()
            .enumerate()
            .take(attempted)
            .filter(|(index, _)| !write_errors.iter().any(|error| error.index == *index))
            .filter_map(|(index, statement)| statement.get("_id").map(|id| (index, id.clone())))
            .collect()
    }
}

impl Operation for WriteBatch {
    type O = BulkWriteResult;

    const NAME: &'static str = "bulkWrite";

    fn build(&mut self, description: &ServerDescription) -> Result<Command> {
        for (index, statement) in self.statements.iter().enumerate() {
            check_statement_size(index, doc_size_bytes(statement)?, description)?;
        }
        check_capabilities(self.kind, &self.statements, description)?;

        let mut body = Document::new();
        body.insert(self.kind.command_name(), self.ns.coll.clone());
        body.insert(self.kind.payload_key(), self.statements.clone());
        append_options(&mut body, Some(&self.options))?;

        Ok(Command::new(self.kind.command_name(), &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &ServerDescription,
    ) -> Result<Self::O> {
        if !self.is_acknowledged() {
            return Ok(BulkWriteResult::default());
        }

        let WriteResponseBody {
            n,
            n_modified,
            upserted,
            write_errors,
            write_concern_error,
            labels,
        } = response.body()?;

        let mut result = BulkWriteResult::default();
        match self.kind {
            WriteKind::Insert => {
                result.inserted_count = n;
                result.inserted_ids = self.inserted_ids(&write_errors);
            }
            WriteKind::Update => {
                let upserted_count = upserted.len() as u64;
                result.matched_count = n.saturating_sub(upserted_count);
                result.modified_count = n_modified;
                result.upserted_count = upserted_count;
                result.upserted_ids = upserted
                    .into_iter()
                    .map(|upserted| (upserted.index, upserted.id))
                    .collect();
            }
            WriteKind::Delete => {
                result.deleted_count = n;
            }
        }

        if write_errors.is_empty() && write_concern_error.is_none() {
            return Ok(result);
        }

        Err(Error::new(
            ErrorKind::BulkWrite(BulkWriteError {
                write_errors,
                write_concern_error,
                batch_errors: Vec::new(),
                partial_result: Some(result),
            }),
            labels,
        ))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn supports_transaction_numbers(&self) -> bool {
        self.statements.iter().all(|statement| match self.kind {
            WriteKind::Insert => true,
            WriteKind::Update => !matches!(statement.get_bool("multi"), Ok(true)),
            WriteKind::Delete => !matches!(statement.get_i32("limit"), Ok(0)),
        })
    }

    fn name(&self) -> &str {
        self.kind.command_name()
    }
}

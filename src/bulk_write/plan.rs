use crate::{
    bson::Document,
    bson_util::{array_entry_size_bytes, doc_size_bytes},
    error::{Error, Result},
    operation::COMMAND_OVERHEAD_SIZE,
    sdam::ServerDescription,
};

use super::{WriteKind, WriteModel};

/// A contiguous run of writes that is sent to the server as a single command.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Batch {
    /// The command the batch is sent with.
    pub kind: WriteKind,

    /// The position of the first write of the batch in the caller's list of writes.
    pub start_index: usize,

    /// The statements of the batch, in the order they were requested.
    pub statements: Vec<Document>,
}

impl Batch {
    /// The number of writes in the batch.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the batch contains no writes. Planned batches never are.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Splits `requests` into the batches that will be sent to `server`, measuring statements by their
/// serialized BSON size.
///
/// See [`plan_with_estimator`].
pub fn plan(requests: &[WriteModel], server: &ServerDescription) -> Result<Vec<Batch>> {
    plan_with_estimator(requests, server, doc_size_bytes)
}

/// Splits `requests` into batches, in order. A batch is closed before the write that would make
/// it exceed the server's `max_write_batch_size`, make its statements exceed the server's
/// `max_message_size_bytes` once the command envelope is accounted for, or switch to a different
/// command. The batches partition `requests` contiguously.
///
/// `estimator` returns the size in bytes of a single statement. This fails without producing any
/// batch if `requests` is empty, if a statement is larger than the server's
/// `max_bson_object_size`, or if a write uses a feature the server doesn't support.
pub fn plan_with_estimator<F>(
    requests: &[WriteModel],
    server: &ServerDescription,
    estimator: F,
) -> Result<Vec<Batch>>
where
    F: Fn(&Document) -> Result<usize>,
{
    if requests.is_empty() {
        return Err(Error::invalid_argument(
            "a bulk write must contain at least one write",
        ));
    }

    let max_count = server.max_write_batch_size().max(1);
    let max_payload_size = server
        .max_message_size_bytes()
        .saturating_sub(COMMAND_OVERHEAD_SIZE);

    let mut batches: Vec<Batch> = Vec::new();
    let mut payload_size = 0;

    for (index, request) in requests.iter().enumerate() {
        request.validate()?;
        let statement = request.to_statement()?;
        let statement_size = estimator(&statement)?;
        check_statement_size(index, statement_size, server)?;

        let kind = request.kind();
        match batches.last_mut() {
            Some(batch) if batch.kind == kind && batch.len() < max_count => {
                let entry_size = array_entry_size_bytes(batch.len(), statement_size);
                if payload_size + entry_size <= max_payload_size {
                    payload_size += entry_size;
                    batch.statements.push(statement);
                    continue;
                }
            }
            _ => {}
        }

        payload_size = array_entry_size_bytes(0, statement_size);
        batches.push(Batch {
            kind,
            start_index: index,
            statements: vec![statement],
        });
    }

    for batch in &batches {
        check_capabilities(batch.kind, &batch.statements, server)?;
    }

    Ok(batches)
}

/// Fails if the statement at `index` is larger than the server accepts for a single document.
pub(crate) fn check_statement_size(
    index: usize,
    statement_size: usize,
    server: &ServerDescription,
) -> Result<()> {
    let max_size = server.max_bson_object_size();
    if statement_size > max_size {
        return Err(Error::invalid_argument(format!(
            "the write at index {} is {} bytes, but the server accepts documents of at most {} \
             bytes",
            index, statement_size, max_size
        )));
    }
    Ok(())
}

/// Fails if any of the statements asks for a collation or for array filters that `server` can't
/// apply. Insert statements are user documents and are never inspected.
pub(crate) fn check_capabilities<'a>(
    kind: WriteKind,
    statements: impl IntoIterator<Item = &'a Document>,
    server: &ServerDescription,
) -> Result<()> {
    if kind == WriteKind::Insert {
        return Ok(());
    }

    for statement in statements {
        if statement.contains_key("collation") && !server.supports_collation() {
            return Err(Error::incompatible_server(format!(
                "the server at {} does not support collation",
                server.address()
            )));
        }
        if statement.contains_key("arrayFilters") && !server.supports_array_filters() {
            return Err(Error::incompatible_server(format!(
                "the server at {} does not support array filters",
                server.address()
            )));
        }
    }

    Ok(())
}

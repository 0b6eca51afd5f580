use tokio::time::Instant;

use super::{
    session::{ClientSession, TransactionState},
    Client,
};
use crate::{
    error::{Error, Result, RETRYABLE_WRITE_ERROR},
    operation::{Operation, Retryability},
    options::{ReadPreference, SelectionCriteria, ServerAddress},
    sdam::{attempt_to_select_server, ServerDescription},
    trace::{
        server_selection::ServerSelectionEventEmitter,
        TracingRepresentation,
        RETRY_TRACING_EVENT_TARGET,
    },
};

/// How a failed attempt is classified, and what happens before the next one.
#[derive(Clone, Copy, Debug, PartialEq)]
enum RetryPath {
    /// Retried on network errors and transient server states, after a rescan and a delay.
    Read,
    /// Retried on errors labeled as retryable. Every attempt carries a fresh transaction number.
    ModernWrite,
    /// Retried on network errors and transient server states, after a rescan.
    LegacyWrite,
    /// Never retried.
    None,
}

impl Client {
    /// Execute the given operation, retrying it while the failure allows it and the attempt budget
    /// isn't spent.
    ///
    /// Server selection is performed anew for every attempt, but how failures are classified is
    /// decided once, against the first server selected. If a retry can't select a server, the
    /// error of the attempt before it is returned. Replies reporting write errors or a write
    /// concern error are never retried.
    pub(crate) async fn execute_operation<T: Operation>(
        &self,
        mut op: T,
        mut session: Option<&mut ClientSession>,
    ) -> Result<T::O> {
        if op.requires_session() && session.is_none() {
            return Err(Error::transaction(format!(
                "{} requires the session the transaction was started on",
                op.name()
            )));
        }

        if let Some(ref mut session) = session {
            if !op.requires_session()
                && matches!(
                    session.transaction.state,
                    TransactionState::Committed { .. } | TransactionState::Aborted
                )
            {
                session.transaction.reset();
            }
        }

        let in_transaction = session.as_deref().is_some_and(ClientSession::in_transaction);
        let retryability = if in_transaction {
            Retryability::None
        } else {
            op.retryability()
        };
        let max_attempts = match retryability {
            Retryability::Read if self.inner.options.retry_reads() => {
                self.inner.options.max_read_attempts()
            }
            Retryability::Write => self.inner.options.max_write_attempts(),
            _ => 1,
        };

        let criteria = self.operation_selection_criteria(&op, session.as_deref());
        let operation_name = op.name().to_string();
        let mut deprioritized: Vec<ServerAddress> = Vec::new();
        let mut previous_error: Option<Error> = None;
        let mut chosen_path: Option<RetryPath> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let server = match self
                .select_server(&criteria, &operation_name, &deprioritized)
                .await
            {
                Ok(server) => server,
                Err(error) => return Err(previous_error.unwrap_or(error)),
            };

            let path = *chosen_path.get_or_insert_with(|| {
                self.retry_path(retryability, &op, &server, session.as_deref())
            });
            let txn_number = match path {
                RetryPath::ModernWrite => session.as_deref().map(ClientSession::next_txn_number),
                _ => None,
            };

            let mut error = match self
                .execute_attempt(&mut op, &server, session.as_deref_mut(), txn_number)
                .await
            {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            let max_wire_version = server.max_wire_version();
            let retryable = !error.is_write_outcome()
                && match path {
                    RetryPath::Read => error.is_read_retryable(max_wire_version),
                    RetryPath::ModernWrite => {
                        if error.should_add_retryable_write_label(max_wire_version) {
                            error.add_label(RETRYABLE_WRITE_ERROR);
                        }
                        error.is_write_retryable()
                    }
                    RetryPath::LegacyWrite => error.is_legacy_write_retryable(max_wire_version),
                    RetryPath::None => false,
                };

            tracing::debug!(
                target: RETRY_TRACING_EVENT_TARGET,
                operation = operation_name.as_str(),
                attempt,
                maxAttempts = max_attempts,
                path = ?path,
                retryable,
                serverHost = server.address().host(),
                failure = error.tracing_representation(),
                "Attempt failed"
            );

            if !retryable || attempt >= max_attempts {
                return Err(error);
            }

            match path {
                RetryPath::Read => {
                    tracing::debug!(
                        target: RETRY_TRACING_EVENT_TARGET,
                        operation = operation_name.as_str(),
                        "Requesting a rescan before retrying"
                    );
                    self.inner.topology.request_update();
                    tokio::time::sleep(self.inner.options.read_retry_delay()).await;
                }
                RetryPath::LegacyWrite => {
                    tracing::debug!(
                        target: RETRY_TRACING_EVENT_TARGET,
                        operation = operation_name.as_str(),
                        "Requesting a rescan before retrying"
                    );
                    self.inner.topology.request_update();
                }
                RetryPath::ModernWrite | RetryPath::None => {}
            }

            deprioritized.push(server.address().clone());
            op.update_for_retry();
            previous_error = Some(error);
        }
    }

    /// Builds the command for `op`, attaches the session and transaction fields, sends it to
    /// `server` and interprets the reply.
    async fn execute_attempt<T: Operation>(
        &self,
        op: &mut T,
        server: &ServerDescription,
        session: Option<&mut ClientSession>,
        txn_number: Option<i64>,
    ) -> Result<T::O> {
        let mut cmd = op.build(server)?;

        if let Some(session) = session {
            if server.supports_sessions() && op.supports_sessions() && op.is_acknowledged() {
                cmd.set_session(session.id());
            }
            if let Some(txn_number) = txn_number {
                cmd.set_txn_number(txn_number);
            }

            match session.transaction.state {
                TransactionState::Starting => {
                    cmd.set_start_transaction();
                    cmd.set_autocommit();
                    cmd.set_txn_number(session.txn_number());
                    session.transaction.state = TransactionState::InProgress;
                }
                TransactionState::InProgress => {
                    cmd.set_autocommit();
                    cmd.set_txn_number(session.txn_number());
                }
                TransactionState::Committed { .. } | TransactionState::Aborted
                    if op.requires_session() =>
                {
                    cmd.set_autocommit();
                    cmd.set_txn_number(session.txn_number());
                }
                _ => {}
            }
        }

        let response = self.inner.transport.send_command(server, cmd).await?;
        response.validate()?;
        op.handle_response(response, server)
    }

    /// Decides how a failure of `op` against `server` is handled.
    fn retry_path<T: Operation>(
        &self,
        retryability: Retryability,
        op: &T,
        server: &ServerDescription,
        session: Option<&ClientSession>,
    ) -> RetryPath {
        match retryability {
            Retryability::Read if self.inner.options.retry_reads() => RetryPath::Read,
            Retryability::Write => {
                let modern = session.is_some_and(|session| {
                    session.retry_writes() && !session.in_transaction()
                }) && server.supports_retryable_writes()
                    && op.is_acknowledged()
                    && op.supports_transaction_numbers()
                    && !op.requires_session();
                if modern {
                    RetryPath::ModernWrite
                } else {
                    RetryPath::LegacyWrite
                }
            }
            _ => RetryPath::None,
        }
    }

    /// The criteria `op` is routed with. Writes always go to the primary. Reads use their own
    /// criteria, then those of the transaction they run in, then those of the client.
    fn operation_selection_criteria<T: Operation>(
        &self,
        op: &T,
        session: Option<&ClientSession>,
    ) -> SelectionCriteria {
        if let Some(criteria) = op.selection_criteria() {
            return criteria.clone();
        }
        if op.retryability() == Retryability::Read {
            let transaction_criteria = session
                .filter(|session| session.in_transaction())
                .and_then(ClientSession::transaction_selection_criteria);
            if let Some(criteria) =
                transaction_criteria.or(self.inner.options.selection_criteria.as_ref())
            {
                return criteria.clone();
            }
        }
        SelectionCriteria::ReadPreference(ReadPreference::Primary)
    }

    /// Selects a server using the provided criteria, waiting for the topology to change while no
    /// suitable server is known, up to the server selection timeout.
    pub(crate) async fn select_server(
        &self,
        criteria: &SelectionCriteria,
        operation_name: &str,
        deprioritized: &[ServerAddress],
    ) -> Result<ServerDescription> {
        let start_time = Instant::now();
        let timeout = self.inner.options.server_selection_timeout();

        let emitter = ServerSelectionEventEmitter::new(criteria, operation_name, start_time, timeout);
        emitter.emit_started_event(&self.topology_description());

        // We only want to emit this message once per operation at most.
        let mut emitted_waiting_message = false;

        loop {
            let description = self.topology_description();

            match attempt_to_select_server(criteria, &description, deprioritized) {
                Err(error) => {
                    emitter.emit_failed_event(&description, &error);
                    return Err(error);
                }
                Ok(Some(server)) => {
                    emitter.emit_succeeded_event(&description, &server);
                    return Ok(server);
                }
                Ok(None) => {
                    if !emitted_waiting_message {
                        emitter.emit_waiting_event(&description);
                        emitted_waiting_message = true;
                    }

                    self.inner.topology.request_update();

                    let remaining = timeout.saturating_sub(start_time.elapsed());
                    if remaining.is_zero() {
                        let error = Error::server_selection(
                            description.server_selection_timeout_error_message(criteria),
                        );
                        emitter.emit_failed_event(&description, &error);
                        return Err(error);
                    }

                    self.inner.topology.wait_for_update(remaining).await;
                }
            }
        }
    }
}

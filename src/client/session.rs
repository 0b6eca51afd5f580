use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document},
    error::{Error, Result},
    operation::{AbortTransaction, CommitTransaction},
    options::{SessionOptions, TransactionOptions},
    selection_criteria::SelectionCriteria,
    Client,
};

/// A MongoDB client session. This struct represents a logical session used for ordering sequential
/// operations. To create a `ClientSession`, call [`Client::start_session`].
///
/// Writes run with a session that has retryable writes enabled are sent with a transaction number
/// taken from the session, which lets the server recognize a retried attempt and apply it at most
/// once.
///
/// ## Transactions
/// Call [`ClientSession::start_transaction`] and pass the session to every operation that should
/// be part of the transaction, then call [`ClientSession::commit_transaction`] or
/// [`ClientSession::abort_transaction`]. Operations run inside a transaction are never retried on
/// their own.
#[derive(Debug)]
pub struct ClientSession {
    client: Client,
    server_session: Arc<ServerSession>,
    options: Option<SessionOptions>,
    pub(crate) transaction: Transaction,
}

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    pub(crate) state: TransactionState,
    pub(crate) options: Option<TransactionOptions>,
}

impl Transaction {
    fn start(&mut self, options: Option<TransactionOptions>) {
        self.state = TransactionState::Starting;
        self.options = options;
    }

    fn commit(&mut self, data_committed: bool) {
        self.state = TransactionState::Committed { data_committed };
    }

    fn abort(&mut self) {
        self.state = TransactionState::Aborted;
    }

    pub(crate) fn reset(&mut self) {
        self.state = TransactionState::None;
        self.options = None;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) enum TransactionState {
    #[default]
    None,
    Starting,
    InProgress,
    Committed {
        /// Whether any data was committed when commit_transaction was initially called. This is
        /// required to determine whether a commitTransaction command should be run if the user
        /// calls commit_transaction again.
        data_committed: bool,
    },
    Aborted,
}

impl ClientSession {
    pub(crate) fn new(client: Client, options: Option<SessionOptions>) -> Self {
        Self {
            client,
            server_session: Arc::new(ServerSession::new()),
            options,
            transaction: Default::default(),
        }
    }

    /// The client used to create this session.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The id of this session.
    pub fn id(&self) -> &Document {
        &self.server_session.id
    }

    /// The options used to create this session.
    pub fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// The transaction number most recently handed out by this session. Starts at 0.
    pub fn txn_number(&self) -> i64 {
        self.server_session.txn_number.load(Ordering::SeqCst)
    }

    /// Advances the transaction number and returns the new value. No two calls on the same
    /// session ever return the same number.
    pub(crate) fn next_txn_number(&self) -> i64 {
        self.server_session.txn_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether writes run with this session may be retried under a transaction number.
    pub(crate) fn retry_writes(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|options| options.retry_writes)
            .unwrap_or_else(|| self.client.options().retry_writes())
    }

    /// Whether this session is currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(
            self.transaction.state,
            TransactionState::Starting | TransactionState::InProgress
        )
    }

    /// The selection criteria the current transaction was started with, if any.
    pub(crate) fn transaction_selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.transaction
            .options
            .as_ref()
            .and_then(|options| options.selection_criteria.as_ref())
    }

    fn default_transaction_options(&self) -> Option<&TransactionOptions> {
        self.options
            .as_ref()
            .and_then(|options| options.default_transaction_options.as_ref())
    }

    /// Starts a new transaction on this session with the given `TransactionOptions`. If no options
    /// are provided, the session's `default_transaction_options` will be used.
    ///
    /// Errors returned from operations executed within a transaction may include a
    /// [`crate::error::TRANSIENT_TRANSACTION_ERROR`] label. This label indicates that the entire
    /// transaction can be retried with a reasonable expectation that it will succeed.
    pub fn start_transaction(
        &mut self,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::transaction("transaction already in progress"));
        }

        let mut options = options
            .into()
            .or_else(|| self.default_transaction_options().cloned());
        if let Some(ref mut options) = options {
            if let Some(defaults) = self.default_transaction_options() {
                if options.write_concern.is_none() {
                    options.write_concern = defaults.write_concern.clone();
                }
                if options.selection_criteria.is_none() {
                    options.selection_criteria = defaults.selection_criteria.clone();
                }
            }
        }
        let client_write_concern = self.client.options().write_concern.clone();
        if client_write_concern.is_some()
            && options
                .as_ref()
                .is_none_or(|options| options.write_concern.is_none())
        {
            options.get_or_insert_with(Default::default).write_concern = client_write_concern;
        }

        if let Some(ref write_concern) = options
            .as_ref()
            .and_then(|options| options.write_concern.as_ref())
        {
            if !write_concern.is_acknowledged() {
                return Err(Error::transaction(
                    "transactions do not support unacknowledged write concerns",
                ));
            }
        }

        self.next_txn_number();
        self.transaction.start(options);
        Ok(())
    }

    /// Commits the transaction that is currently active on this session.
    ///
    /// This method may return an error with a [`crate::error::UNKNOWN_TRANSACTION_COMMIT_RESULT`]
    /// label. This label indicates that it is unknown whether the commit has satisfied the write
    /// concern associated with the transaction. If an error with this label is returned, it is
    /// safe to retry the commit until the write concern is satisfied or an error without the label
    /// is returned.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction("no transaction started")),
            TransactionState::Aborted => Err(Error::transaction(
                "Cannot call commitTransaction after calling abortTransaction",
            )),
            TransactionState::Starting => {
                self.transaction.commit(false);
                Ok(())
            }
            TransactionState::InProgress => {
                let commit_transaction = CommitTransaction::new(self.transaction_write_concern());
                self.transaction.commit(true);
                self.client
                    .clone()
                    .execute_operation(commit_transaction, Some(self))
                    .await
            }
            TransactionState::Committed {
                data_committed: true,
            } => {
                let mut commit_transaction =
                    CommitTransaction::new(self.transaction_write_concern());
                crate::operation::Operation::update_for_retry(&mut commit_transaction);
                self.client
                    .clone()
                    .execute_operation(commit_transaction, Some(self))
                    .await
            }
            TransactionState::Committed {
                data_committed: false,
            } => Ok(()),
        }
    }

    /// Aborts the transaction that is currently active on this session. Any open transaction will
    /// be aborted automatically in the server after its lifetime expires.
    ///
    /// The outcome of the `abortTransaction` command itself is not reported: the transaction is
    /// over on the client either way.
    pub async fn abort_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction("no transaction started")),
            TransactionState::Committed { .. } => Err(Error::transaction(
                "Cannot call abortTransaction after calling commitTransaction",
            )),
            TransactionState::Aborted => {
                Err(Error::transaction("cannot call abortTransaction twice"))
            }
            TransactionState::Starting => {
                self.transaction.abort();
                Ok(())
            }
            TransactionState::InProgress => {
                let abort_transaction = AbortTransaction::new(self.transaction_write_concern());
                self.transaction.abort();
                // Errors returned from running an abortTransaction command should be ignored.
                let _result = self
                    .client
                    .clone()
                    .execute_operation(abort_transaction, Some(self))
                    .await;
                Ok(())
            }
        }
    }

    fn transaction_write_concern(&self) -> Option<crate::options::WriteConcern> {
        self.transaction
            .options
            .as_ref()
            .and_then(|options| options.write_concern.clone())
    }
}

/// Client side abstraction of a server session. The transaction number lives here so that it can
/// be advanced through a shared reference.
#[derive(Debug)]
pub(crate) struct ServerSession {
    /// The id of the server session to which this corresponds.
    id: Document,

    /// A monotonically increasing transaction number for this session.
    txn_number: AtomicI64,
}

impl ServerSession {
    /// Creates a new session, generating the id client side.
    fn new() -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });

        Self {
            id: doc! { "id": binary },
            txn_number: AtomicI64::new(0),
        }
    }
}

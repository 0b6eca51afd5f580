mod executor;
pub(crate) mod options;
pub(crate) mod session;

use std::sync::Arc;

use derive_where::derive_where;

use crate::{
    bson::Document,
    cmap::Transport,
    error::{Error, Result},
    operation::RunCommand,
    options::{ClientOptions, SelectionCriteria, SessionOptions},
    sdam::{Topology, TopologyDescription},
    ClientSession,
    Collection,
};

/// This is the main entry point for the API. A `Client` routes operations to the servers of a
/// deployment, retrying them when that is safe, and splits large writes into batches.
///
/// The client doesn't connect to anything itself. It reads the state of the deployment from a
/// [`Topology`] and sends commands through a [`Transport`].
///
/// `Client` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks. For example:
///
/// ```rust
/// # use mongodb_dispatch::{bson::doc, Client, error::Result};
/// #
/// # async fn start_workers(client: Client) -> Result<()> {
/// for i in 0..5 {
///     let client_ref = client.clone();
///
///     tokio::task::spawn(async move {
///         let collection = client_ref.collection("items", &format!("coll{}", i));
///
///         // Do something with the collection
///     });
/// }
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive_where(Debug)]
struct ClientInner {
    #[derive_where(skip)]
    topology: Arc<dyn Topology>,
    #[derive_where(skip)]
    transport: Arc<dyn Transport>,
    options: ClientOptions,
}

impl Client {
    /// Creates a new `Client` that reads the deployment from `topology` and sends commands through
    /// `transport`.
    pub fn new(
        topology: Arc<dyn Topology>,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let inner = Arc::new(ClientInner {
            topology,
            transport,
            options,
        });
        Ok(Self { inner })
    }

    /// Gets the options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Gets a handle to the collection `name` in the database `db`.
    pub fn collection(&self, db: &str, name: &str) -> Collection {
        Collection::new(self.clone(), db, name)
    }

    /// Runs a database command against the database `db`.
    ///
    /// The command is sent as is, once: commands run this way are never retried. If
    /// `selection_criteria` is not specified, the client's criteria are used, falling back to the
    /// primary.
    pub async fn run_command(
        &self,
        db: &str,
        command: Document,
        selection_criteria: impl Into<Option<SelectionCriteria>>,
    ) -> Result<Document> {
        self.run_command_common(db, command, selection_criteria.into(), None)
            .await
    }

    /// Runs a database command against the database `db` using the provided `ClientSession`.
    pub async fn run_command_with_session(
        &self,
        db: &str,
        command: Document,
        selection_criteria: impl Into<Option<SelectionCriteria>>,
        session: &mut ClientSession,
    ) -> Result<Document> {
        self.run_command_common(db, command, selection_criteria.into(), Some(session))
            .await
    }

    async fn run_command_common(
        &self,
        db: &str,
        command: Document,
        selection_criteria: Option<SelectionCriteria>,
        session: Option<&mut ClientSession>,
    ) -> Result<Document> {
        let op = RunCommand::new(db.to_string(), command, selection_criteria)?;
        self.execute_operation(op, session).await
    }

    /// Starts a new [`ClientSession`].
    pub fn start_session(&self, options: impl Into<Option<SessionOptions>>) -> ClientSession {
        ClientSession::new(self.clone(), options.into())
    }

    /// Commits the transaction active on `session`.
    ///
    /// Ending a transaction requires the session it was started on; calling this without one is
    /// an error, reported before anything is sent.
    pub async fn commit_transaction(&self, session: Option<&mut ClientSession>) -> Result<()> {
        match session {
            Some(session) => session.commit_transaction().await,
            None => Err(Error::transaction(
                "commitTransaction requires the session the transaction was started on",
            )),
        }
    }

    /// Aborts the transaction active on `session`.
    ///
    /// See [`Client::commit_transaction`].
    pub async fn abort_transaction(&self, session: Option<&mut ClientSession>) -> Result<()> {
        match session {
            Some(session) => session.abort_transaction().await,
            None => Err(Error::transaction(
                "abortTransaction requires the session the transaction was started on",
            )),
        }
    }

    /// The latest snapshot of the deployment, with the latency window and heartbeat frequency
    /// configured on this client applied.
    pub(crate) fn topology_description(&self) -> TopologyDescription {
        let mut description = self.inner.topology.description();
        if let Some(local_threshold) = self.inner.options.local_threshold {
            description.local_threshold = Some(local_threshold);
        }
        if let Some(heartbeat_freq) = self.inner.options.heartbeat_freq {
            description.heartbeat_freq = Some(heartbeat_freq);
        }
        description
    }
}

//! Contains the [`Transport`] seam through which commands reach the servers, along with the
//! command and reply types that cross it.

#[cfg(test)]
mod test;

use futures_core::future::BoxFuture;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    bson::{Bson, Document},
    bson_util,
    error::{CommandError, Error, ErrorKind, Result},
    options::ServerAddress,
    sdam::ServerDescription,
};

/// Sends commands to servers and returns their replies.
///
/// Implementations own connection establishment, pooling and wire encoding. A reply with
/// `ok: 0` is returned as a successful [`RawCommandResponse`]; errors are reserved for failures to
/// deliver the command or to receive its reply, which should be reported as
/// [`ErrorKind::Io`](crate::error::ErrorKind::Io) so they are classified as network errors.
pub trait Transport: Send + Sync {
    /// Sends `command` to `server` and waits for the reply.
    fn send_command<'a>(
        &'a self,
        server: &'a ServerDescription,
        command: Command,
    ) -> BoxFuture<'a, Result<RawCommandResponse>>;
}

/// A database command ready to be sent to a server.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Command {
    /// The name of the command, which is also the first key of `body`.
    pub name: String,

    /// The database the command runs against.
    pub target_db: String,

    /// The full command document, including the session and transaction fields.
    pub body: Document,
}

impl Command {
    /// Constructs a new command.
    pub(crate) fn new(name: impl Into<String>, target_db: impl Into<String>, body: Document) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
        }
    }

    pub(crate) fn set_session(&mut self, session_id: &Document) {
        self.body.insert("lsid", session_id.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.body.insert("txnNumber", txn_number);
    }

    pub(crate) fn set_autocommit(&mut self) {
        self.body.insert("autocommit", false);
    }

    pub(crate) fn set_start_transaction(&mut self) {
        self.body.insert("startTransaction", true);
    }

    /// The transaction number attached to this command, if any.
    pub fn txn_number(&self) -> Option<i64> {
        self.body.get_i64("txnNumber").ok()
    }
}

/// The reply a server sent to a [`Command`].
#[derive(Clone, Debug)]
pub struct RawCommandResponse {
    source: ServerAddress,
    raw: Document,
}

#[derive(Deserialize)]
struct ErrorLabels {
    #[serde(rename = "errorLabels", default)]
    labels: Vec<String>,
}

impl RawCommandResponse {
    /// Wraps the reply document `raw` received from the server at `source`.
    pub fn new(source: ServerAddress, raw: Document) -> Self {
        Self { source, raw }
    }

    /// The address of the server that sent this response.
    pub fn source_address(&self) -> &ServerAddress {
        &self.source
    }

    /// The reply document.
    pub fn raw_body(&self) -> &Document {
        &self.raw
    }

    /// Returns whether this response indicates a success or not (i.e. if "ok: 1")
    pub(crate) fn is_success(&self) -> bool {
        match self.raw.get("ok") {
            Some(b) => bson_util::get_int(b) == Some(1),
            _ => false,
        }
    }

    /// Returns an error carrying the server's code, message and labels if the command failed.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }

        let command_error: CommandError = crate::bson::from_bson(Bson::Document(
            self.raw.clone(),
        ))
        .map_err(|_| Error::invalid_response("invalid server response"))?;
        let labels: ErrorLabels = crate::bson::from_bson(Bson::Document(self.raw.clone()))
            .unwrap_or(ErrorLabels { labels: Vec::new() });

        Err(Error::new(
            ErrorKind::Command(command_error),
            Some(labels.labels),
        ))
    }

    /// Deserialize the body of the response.
    pub(crate) fn body<T: DeserializeOwned>(&self) -> Result<T> {
        crate::bson::from_bson(Bson::Document(self.raw.clone()))
            .map_err(|e| Error::invalid_response(format!("{}", e)))
    }
}

pub mod options;

use std::{fmt, str::FromStr};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};

use self::options::*;
use crate::{
    bson::Document,
    bson_util::get_or_prepend_id_field,
    bulk_write::{DeleteModel, ReplaceOneModel, UpdateModel, WriteModel},
    concern::WriteConcern,
    error::{convert_bulk_errors, Error, Result},
    operation::{Find, WriteBatch},
    results::{BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
    Client,
    ClientSession,
};

/// `Collection` is the client-side abstraction of a MongoDB Collection. It can be used to perform
/// the write operations and finds of a collection. A `Collection` can be obtained through
/// [`Client::collection`].
///
/// Single-document writes are sent as one command and retried according to the client's retry
/// settings. Multi-document writes go through [`Collection::bulk_write`], which splits them into
/// batches the server accepts.
///
/// `Collection` is cheap to clone, and clones share the underlying [`Client`].
#[derive(Clone, Debug)]
pub struct Collection {
    client: Client,
    ns: Namespace,
}

impl Collection {
    pub(crate) fn new(client: Client, db: &str, name: &str) -> Self {
        Self {
            client,
            ns: Namespace::new(db, name),
        }
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        &self.ns.coll
    }

    /// Gets the namespace of the `Collection`.
    ///
    /// The namespace of a MongoDB collection is the concatenation of the name of the database
    /// containing it, the '.' character, and the name of the collection itself. For example, if a
    /// collection named "bar" is created in a database named "foo", the namespace of the collection
    /// is "foo.bar".
    pub fn namespace(&self) -> Namespace {
        self.ns.clone()
    }

    /// Gets the client this collection belongs to.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Picks the write concern an operation is sent with. Operations inside a transaction inherit
    /// the transaction's write concern and can't set their own.
    fn resolve_write_concern(
        &self,
        write_concern: Option<WriteConcern>,
        session: Option<&ClientSession>,
    ) -> Result<Option<WriteConcern>> {
        if session.is_some_and(ClientSession::in_transaction) {
            if write_concern.is_some() {
                return Err(Error::invalid_argument(
                    "Cannot set write concern after starting a transaction",
                ));
            }
            return Ok(None);
        }
        Ok(write_concern.or_else(|| self.client.options().write_concern.clone()))
    }

    /// Sends a single write as a one-statement command, skipping the planner.
    async fn execute_single_write(
        &self,
        model: WriteModel,
        mut options: BulkWriteOptions,
        session: Option<&mut ClientSession>,
    ) -> Result<BulkWriteResult> {
        options.write_concern =
            self.resolve_write_concern(options.write_concern.take(), session.as_deref())?;
        model.validate()?;

        let batch = WriteBatch::new(
            self.namespace(),
            model.kind(),
            vec![model.to_statement()?],
            options,
        );
        self.client
            .execute_operation(batch, session)
            .await
            .map_err(convert_bulk_errors)
    }

    async fn insert_one_common(
        &self,
        mut doc: Document,
        options: Option<InsertOneOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<InsertOneResult> {
        let inserted_id = get_or_prepend_id_field(&mut doc);
        let options = options.map(Into::into).unwrap_or_default();
        self.execute_single_write(WriteModel::InsertOne(doc), options, session)
            .await?;

        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts `doc` into the collection, generating an `_id` for it if it has none.
    ///
    /// This operation will retry once upon failure if the server and encountered error support
    /// retryability.
    pub async fn insert_one(
        &self,
        doc: Document,
        options: impl Into<Option<InsertOneOptions>>,
    ) -> Result<InsertOneResult> {
        self.insert_one_common(doc, options.into(), None).await
    }

    /// Inserts `doc` into the collection using the provided `ClientSession`.
    pub async fn insert_one_with_session(
        &self,
        doc: Document,
        options: impl Into<Option<InsertOneOptions>>,
        session: &mut ClientSession,
    ) -> Result<InsertOneResult> {
        self.insert_one_common(doc, options.into(), Some(session))
            .await
    }

    async fn insert_many_common(
        &self,
        docs: impl IntoIterator<Item = Document>,
        options: Option<InsertManyOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<InsertManyResult> {
        let models = docs.into_iter().map(WriteModel::InsertOne).collect();
        let options = options.map(Into::into);
        self.bulk_write_common(models, options, session)
            .await
            .map(InsertManyResult::from)
    }

    /// Inserts the documents in `docs` into the collection. The documents are split into as many
    /// insert commands as the server's limits require.
    ///
    /// Failures are reported as an [`ErrorKind::BulkWrite`](crate::error::ErrorKind::BulkWrite)
    /// error whose indices refer to positions in `docs`.
    pub async fn insert_many(
        &self,
        docs: impl IntoIterator<Item = Document>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<InsertManyResult> {
        self.insert_many_common(docs, options.into(), None).await
    }

    /// Inserts the documents in `docs` into the collection using the provided `ClientSession`.
    pub async fn insert_many_with_session(
        &self,
        docs: impl IntoIterator<Item = Document>,
        options: impl Into<Option<InsertManyOptions>>,
        session: &mut ClientSession,
    ) -> Result<InsertManyResult> {
        self.insert_many_common(docs, options.into(), Some(session))
            .await
    }

    async fn update_common(
        &self,
        filter: Document,
        update: UpdateModifications,
        multi: bool,
        options: Option<UpdateOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<UpdateResult> {
        let options = options.unwrap_or_default();
        let model = UpdateModel {
            filter,
            update,
            array_filters: options.array_filters,
            collation: options.collation,
            upsert: options.upsert,
        };
        let model = if multi {
            WriteModel::UpdateMany(model)
        } else {
            WriteModel::UpdateOne(model)
        };
        let options = BulkWriteOptions {
            ordered: None,
            bypass_document_validation: options.bypass_document_validation,
            comment: options.comment,
            write_concern: options.write_concern,
        };

        self.execute_single_write(model, options, session)
            .await
            .map(UpdateResult::from)
    }

    /// Updates up to one document matching `filter` in the collection.
    ///
    /// This operation will retry once upon failure if the server and encountered error support
    /// retryability.
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), false, options.into(), None)
            .await
    }

    /// Updates up to one document matching `filter` in the collection using the provided
    /// `ClientSession`.
    pub async fn update_one_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), false, options.into(), Some(session))
            .await
    }

    /// Updates all documents matching `filter` in the collection.
    ///
    /// Writes that affect several documents are never sent with a transaction number, so this is
    /// only retried after network errors and transient server states.
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), true, options.into(), None)
            .await
    }

    /// Updates all documents matching `filter` in the collection using the provided
    /// `ClientSession`.
    pub async fn update_many_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), true, options.into(), Some(session))
            .await
    }

    async fn replace_one_common(
        &self,
        filter: Document,
        replacement: Document,
        options: Option<ReplaceOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<UpdateResult> {
        let options = options.unwrap_or_default();
        let model = WriteModel::ReplaceOne(ReplaceOneModel {
            filter,
            replacement,
            collation: options.collation,
            upsert: options.upsert,
        });
        let options = BulkWriteOptions {
            ordered: None,
            bypass_document_validation: options.bypass_document_validation,
            comment: options.comment,
            write_concern: options.write_concern,
        };

        self.execute_single_write(model, options, session)
            .await
            .map(UpdateResult::from)
    }

    /// Replaces up to one document matching `filter` in the collection with `replacement`.
    ///
    /// This operation will retry once upon failure if the server and encountered error support
    /// retryability.
    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: impl Into<Option<ReplaceOptions>>,
    ) -> Result<UpdateResult> {
        self.replace_one_common(filter, replacement, options.into(), None)
            .await
    }

    /// Replaces up to one document matching `filter` in the collection with `replacement` using
    /// the provided `ClientSession`.
    pub async fn replace_one_with_session(
        &self,
        filter: Document,
        replacement: Document,
        options: impl Into<Option<ReplaceOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        self.replace_one_common(filter, replacement, options.into(), Some(session))
            .await
    }

    async fn delete_common(
        &self,
        filter: Document,
        multi: bool,
        options: Option<DeleteOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<DeleteResult> {
        let options = options.unwrap_or_default();
        let model = DeleteModel {
            filter,
            collation: options.collation,
        };
        let model = if multi {
            WriteModel::DeleteMany(model)
        } else {
            WriteModel::DeleteOne(model)
        };
        let options = BulkWriteOptions {
            ordered: None,
            bypass_document_validation: None,
            comment: options.comment,
            write_concern: options.write_concern,
        };

        self.execute_single_write(model, options, session)
            .await
            .map(DeleteResult::from)
    }

    /// Deletes up to one document found matching `filter`.
    ///
    /// This operation will retry once upon failure if the server and encountered error support
    /// retryability.
    pub async fn delete_one(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, false, options.into(), None).await
    }

    /// Deletes up to one document found matching `filter` using the provided `ClientSession`.
    pub async fn delete_one_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, false, options.into(), Some(session))
            .await
    }

    /// Deletes all documents stored in the collection matching `filter`.
    pub async fn delete_many(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, true, options.into(), None).await
    }

    /// Deletes all documents stored in the collection matching `filter` using the provided
    /// `ClientSession`.
    pub async fn delete_many_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, true, options.into(), Some(session))
            .await
    }

    async fn bulk_write_common(
        &self,
        models: Vec<WriteModel>,
        options: Option<BulkWriteOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<BulkWriteResult> {
        let mut options = options.unwrap_or_default();
        options.write_concern =
            self.resolve_write_concern(options.write_concern.take(), session.as_deref())?;

        self.client
            .execute_bulk_write(self.namespace(), models, options, session)
            .await
    }

    /// Executes the writes in `models`, split into as few commands as the server's limits allow.
    ///
    /// Ordered bulk writes (the default) stop after the first command that reports a failed
    /// write or a write concern error. Unordered ones send every command. Either way, the
    /// [`BulkWriteError`](crate::error::BulkWriteError) of a failed bulk write carries the
    /// results of the writes that were applied, and every index it reports refers to a position in
    /// `models`.
    pub async fn bulk_write(
        &self,
        models: impl IntoIterator<Item = WriteModel>,
        options: impl Into<Option<BulkWriteOptions>>,
    ) -> Result<BulkWriteResult> {
        self.bulk_write_common(models.into_iter().collect(), options.into(), None)
            .await
    }

    /// Executes the writes in `models` using the provided `ClientSession`.
    pub async fn bulk_write_with_session(
        &self,
        models: impl IntoIterator<Item = WriteModel>,
        options: impl Into<Option<BulkWriteOptions>>,
        session: &mut ClientSession,
    ) -> Result<BulkWriteResult> {
        self.bulk_write_common(models.into_iter().collect(), options.into(), Some(session))
            .await
    }

    /// Finds the documents in the collection matching `filter`, returning the first batch of
    /// results.
    ///
    /// Finds are retried once after network errors and transient server states unless
    /// `retry_reads` is disabled.
    pub async fn find(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<Document>> {
        let find = Find::new(self.namespace(), filter, options.into());
        self.client.execute_operation(find, None).await
    }

    /// Finds the documents in the collection matching `filter` using the provided
    /// `ClientSession`.
    pub async fn find_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
        session: &mut ClientSession,
    ) -> Result<Vec<Document>> {
        let find = Find::new(self.namespace(), filter, options.into());
        self.client.execute_operation(find, Some(session)).await
    }
}

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl Namespace {
    /// Construct a `Namespace` with the given database and collection.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(Error::invalid_argument(format!(
                "Missing one or more fields in namespace: {}",
                s
            ))),
        }
    }
}

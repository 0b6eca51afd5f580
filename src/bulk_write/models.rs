use std::convert::TryFrom;

use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Bson, Document},
    bson_util::{get_or_prepend_id_field, replacement_document_check, update_document_check},
    error::{Error, Result},
    options::{Collation, UpdateModifications},
};

const COLLATION_KEYS: [&str; 2] = ["collation", "Collation"];
const ARRAY_FILTERS_KEYS: [&str; 2] = ["arrayFilters", "array_filters"];

/// The server command a write is sent with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
#[non_exhaustive]
pub enum WriteKind {
    /// Sent with an `insert` command.
    #[display("insert")]
    Insert,

    /// Sent with an `update` command.
    #[display("update")]
    Update,

    /// Sent with a `delete` command.
    #[display("delete")]
    Delete,
}

impl WriteKind {
    pub(crate) fn command_name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// The field of the command that carries the statements.
    pub(crate) fn payload_key(self) -> &'static str {
        match self {
            Self::Insert => "documents",
            Self::Update => "updates",
            Self::Delete => "deletes",
        }
    }
}

/// An update applied to the documents matching a filter, used by [`WriteModel::UpdateOne`] and
/// [`WriteModel::UpdateMany`].
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[non_exhaustive]
pub struct UpdateModel {
    /// The filter to use.
    #[builder(setter(into))]
    pub filter: Document,

    /// The update to perform.
    #[builder(setter(into))]
    pub update: UpdateModifications,

    /// A set of filters specifying to which array elements an update should apply.
    #[builder(default, setter(strip_option))]
    pub array_filters: Option<Vec<Document>>,

    /// The collation to use.
    #[builder(default, setter(strip_option))]
    pub collation: Option<Collation>,

    /// Whether the update should insert a document if no document matches the filter.
    #[builder(default, setter(strip_option))]
    pub upsert: Option<bool>,
}

/// A replacement of the first document matching a filter.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[non_exhaustive]
pub struct ReplaceOneModel {
    /// The filter to use.
    #[builder(setter(into))]
    pub filter: Document,

    /// The replacement document.
    #[builder(setter(into))]
    pub replacement: Document,

    /// The collation to use.
    #[builder(default, setter(strip_option))]
    pub collation: Option<Collation>,

    /// Whether the replacement should be inserted if no document matches the filter.
    #[builder(default, setter(strip_option))]
    pub upsert: Option<bool>,
}

/// A deletion of the documents matching a filter, used by [`WriteModel::DeleteOne`] and
/// [`WriteModel::DeleteMany`].
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[non_exhaustive]
pub struct DeleteModel {
    /// The filter to use.
    #[builder(setter(into))]
    pub filter: Document,

    /// The collation to use.
    #[builder(default, setter(strip_option))]
    pub collation: Option<Collation>,
}

/// A single write in a [`Collection::bulk_write`](crate::Collection::bulk_write).
///
/// Models can also be parsed from their document form with [`TryFrom<Document>`], e.g.
/// `{ "updateOne": { "filter": { "x": 1 }, "update": { "$inc": { "x": 1 } } } }`. Both
/// `collation` and `Collation` are accepted as the collation key, and both `arrayFilters` and
/// `array_filters` as the array filters key.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum WriteModel {
    /// Inserts the document, generating an `_id` for it if it has none.
    InsertOne(Document),

    /// Updates the first document matching the filter.
    UpdateOne(UpdateModel),

    /// Updates every document matching the filter.
    UpdateMany(UpdateModel),

    /// Replaces the first document matching the filter.
    ReplaceOne(ReplaceOneModel),

    /// Deletes the first document matching the filter.
    DeleteOne(DeleteModel),

    /// Deletes every document matching the filter.
    DeleteMany(DeleteModel),
}

impl WriteModel {
    /// Inserts `document`.
    pub fn insert_one(document: Document) -> Self {
        Self::InsertOne(document)
    }

    /// Updates the first document matching `filter` with `update`.
    pub fn update_one(filter: Document, update: impl Into<UpdateModifications>) -> Self {
        Self::UpdateOne(UpdateModel::builder().filter(filter).update(update).build())
    }

    /// Updates every document matching `filter` with `update`.
    pub fn update_many(filter: Document, update: impl Into<UpdateModifications>) -> Self {
        Self::UpdateMany(UpdateModel::builder().filter(filter).update(update).build())
    }

    /// Replaces the first document matching `filter` with `replacement`.
    pub fn replace_one(filter: Document, replacement: Document) -> Self {
        Self::ReplaceOne(
            ReplaceOneModel::builder()
                .filter(filter)
                .replacement(replacement)
                .build(),
        )
    }

    /// Deletes the first document matching `filter`.
    pub fn delete_one(filter: Document) -> Self {
        Self::DeleteOne(DeleteModel::builder().filter(filter).build())
    }

    /// Deletes every document matching `filter`.
    pub fn delete_many(filter: Document) -> Self {
        Self::DeleteMany(DeleteModel::builder().filter(filter).build())
    }

    /// The command this write is sent with.
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::InsertOne(_) => WriteKind::Insert,
            Self::UpdateOne(_) | Self::UpdateMany(_) | Self::ReplaceOne(_) => WriteKind::Update,
            Self::DeleteOne(_) | Self::DeleteMany(_) => WriteKind::Delete,
        }
    }

    /// Checks the parts of the write that can be checked without a server.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::UpdateOne(model) | Self::UpdateMany(model) => match model.update {
                UpdateModifications::Document(ref update) => update_document_check(update),
                UpdateModifications::Pipeline(ref pipeline) if pipeline.is_empty() => Err(
                    Error::invalid_argument("an update pipeline must not be empty"),
                ),
                UpdateModifications::Pipeline(_) => Ok(()),
            },
            Self::ReplaceOne(model) => replacement_document_check(&model.replacement),
            Self::InsertOne(_) | Self::DeleteOne(_) | Self::DeleteMany(_) => Ok(()),
        }
    }

    /// Returns the `_id` of an inserted document, generating one first if needed. Other writes
    /// return `None`.
    pub(crate) fn get_or_assign_id(&mut self) -> Option<Bson> {
        match self {
            Self::InsertOne(document) => Some(get_or_prepend_id_field(document)),
            _ => None,
        }
    }

    /// The entry for this write in the statement array of its command.
    pub(crate) fn to_statement(&self) -> Result<Document> {
        let statement = match self {
            Self::InsertOne(document) => document.clone(),
            Self::UpdateOne(model) | Self::UpdateMany(model) => {
                let multi = matches!(self, Self::UpdateMany(_));
                let mut statement = doc! {
                    "q": model.filter.clone(),
                    "u": model.update.to_bson(),
                    "multi": multi,
                };
                if let Some(upsert) = model.upsert {
                    statement.insert("upsert", upsert);
                }
                if let Some(ref collation) = model.collation {
                    statement.insert("collation", crate::bson::to_document(collation)?);
                }
                if let Some(ref array_filters) = model.array_filters {
                    statement.insert("arrayFilters", array_filters.clone());
                }
                statement
            }
            Self::ReplaceOne(model) => {
                let mut statement = doc! {
                    "q": model.filter.clone(),
                    "u": model.replacement.clone(),
                    "multi": false,
                };
                if let Some(upsert) = model.upsert {
                    statement.insert("upsert", upsert);
                }
                if let Some(ref collation) = model.collation {
                    statement.insert("collation", crate::bson::to_document(collation)?);
                }
                statement
            }
            Self::DeleteOne(model) | Self::DeleteMany(model) => {
                let limit = if matches!(self, Self::DeleteOne(_)) { 1 } else { 0 };
                let mut statement = doc! {
                    "q": model.filter.clone(),
                    "limit": limit,
                };
                if let Some(ref collation) = model.collation {
                    statement.insert("collation", crate::bson::to_document(collation)?);
                }
                statement
            }
        };
        Ok(statement)
    }
}

impl TryFrom<Document> for WriteModel {
    type Error = Error;

    fn try_from(document: Document) -> Result<Self> {
        let mut entries = document.into_iter();
        let (name, body) = match (entries.next(), entries.next()) {
            (Some((name, Bson::Document(body))), None) => (name, body),
            _ => {
                return Err(Error::invalid_argument(
                    "a write model must be a document with a single key naming the write, whose \
                     value is a document",
                ))
            }
        };

        let mut fields = ModelFields { name: &name, body };
        let model = match name.as_str() {
            "insertOne" => WriteModel::InsertOne(fields.required_document("document")?),
            "updateOne" | "updateMany" => {
                let model = UpdateModel {
                    filter: fields.required_document("filter")?,
                    update: fields.update()?,
                    array_filters: fields.array_filters()?,
                    collation: fields.collation()?,
                    upsert: fields.upsert()?,
                };
                if name == "updateOne" {
                    WriteModel::UpdateOne(model)
                } else {
                    WriteModel::UpdateMany(model)
                }
            }
            "replaceOne" => WriteModel::ReplaceOne(ReplaceOneModel {
                filter: fields.required_document("filter")?,
                replacement: fields.required_document("replacement")?,
                collation: fields.collation()?,
                upsert: fields.upsert()?,
            }),
            "deleteOne" | "deleteMany" => {
                let model = DeleteModel {
                    filter: fields.required_document("filter")?,
                    collation: fields.collation()?,
                };
                if name == "deleteOne" {
                    WriteModel::DeleteOne(model)
                } else {
                    WriteModel::DeleteMany(model)
                }
            }
            other => {
                return Err(Error::invalid_argument(format!(
                    "unrecognized write model: {}",
                    other
                )))
            }
        };
        fields.finish()?;
        model.validate()?;

        Ok(model)
    }
}

/// The fields of a write model in document form, removed one by one as they are parsed.
struct ModelFields<'a> {
    name: &'a str,
    body: Document,
}

impl ModelFields<'_> {
    fn required_document(&mut self, key: &str) -> Result<Document> {
        match self.body.remove(key) {
            Some(Bson::Document(document)) => Ok(document),
            Some(other) => Err(self.wrong_type(key, "a document", &other)),
            None => Err(Error::invalid_argument(format!(
                "{} is missing the required field {}",
                self.name, key
            ))),
        }
    }

    fn update(&mut self) -> Result<UpdateModifications> {
        match self.body.remove("update") {
            Some(Bson::Document(document)) => Ok(UpdateModifications::Document(document)),
            Some(Bson::Array(stages)) => stages
                .into_iter()
                .map(|stage| match stage {
                    Bson::Document(stage) => Ok(stage),
                    other => Err(self.wrong_type("update", "a pipeline of documents", &other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(UpdateModifications::Pipeline),
            Some(other) => Err(self.wrong_type("update", "a document or a pipeline", &other)),
            None => Err(Error::invalid_argument(format!(
                "{} is missing the required field update",
                self.name
            ))),
        }
    }

    fn upsert(&mut self) -> Result<Option<bool>> {
        match self.body.remove("upsert") {
            Some(Bson::Boolean(upsert)) => Ok(Some(upsert)),
            Some(other) => Err(self.wrong_type("upsert", "a boolean", &other)),
            None => Ok(None),
        }
    }

    fn collation(&mut self) -> Result<Option<Collation>> {
        match self.remove_any(&COLLATION_KEYS)? {
            Some(Bson::Document(collation)) => crate::bson::from_document(collation)
                .map(Some)
                .map_err(|e| {
                    Error::invalid_argument(format!("invalid collation in {}: {}", self.name, e))
                }),
            Some(other) => Err(self.wrong_type("collation", "a document", &other)),
            None => Ok(None),
        }
    }

    fn array_filters(&mut self) -> Result<Option<Vec<Document>>> {
        match self.remove_any(&ARRAY_FILTERS_KEYS)? {
            Some(Bson::Array(filters)) => filters
                .into_iter()
                .map(|filter| match filter {
                    Bson::Document(filter) => Ok(filter),
                    other => Err(self.wrong_type("arrayFilters", "an array of documents", &other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(self.wrong_type("arrayFilters", "an array of documents", &other)),
            None => Ok(None),
        }
    }

    /// Removes the value stored under whichever of `keys` is present. Spelling the same field two
    /// ways is ambiguous and rejected.
    fn remove_any(&mut self, keys: &[&str]) -> Result<Option<Bson>> {
        let mut found = None;
        for key in keys {
            if let Some(value) = self.body.remove(*key) {
                if found.is_some() {
                    return Err(Error::invalid_argument(format!(
                        "{} specifies {} more than once",
                        self.name, keys[0]
                    )));
                }
                found = Some(value);
            }
        }
        Ok(found)
    }

    fn finish(self) -> Result<()> {
        match crate::bson_util::first_key(&self.body) {
            Some(key) => Err(Error::invalid_argument(format!(
                "unrecognized field in {}: {}",
                self.name, key
            ))),
            None => Ok(()),
        }
    }

    fn wrong_type(&self, key: &str, expected: &str, actual: &Bson) -> Error {
        Error::invalid_argument(format!(
            "{} in {} must be {}, got {:?}",
            key,
            self.name,
            expected,
            actual.element_type()
        ))
    }
}

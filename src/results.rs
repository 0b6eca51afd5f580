//! Contains the types of results returned by write and bulk write operations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::bson::Bson;

/// The result of a [`Collection::insert_one`](crate::Collection::insert_one) operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertOneResult {
    /// The `_id` field of the document inserted.
    pub inserted_id: Bson,
}

/// The result of a [`Collection::insert_many`](crate::Collection::insert_many) operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertManyResult {
    /// The `_id` field of the documents inserted, keyed by their index in the input.
    pub inserted_ids: HashMap<usize, Bson>,
}

impl From<BulkWriteResult> for InsertManyResult {
    fn from(result: BulkWriteResult) -> Self {
        Self {
            inserted_ids: result.inserted_ids.into_iter().collect(),
        }
    }
}

/// The result of a [`Collection::update_one`](crate::Collection::update_one),
/// [`Collection::update_many`](crate::Collection::update_many) or
/// [`Collection::replace_one`](crate::Collection::replace_one) operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateResult {
    /// The number of documents that matched the filter.
    pub matched_count: u64,
    /// The number of documents that were modified by the operation.
    pub modified_count: u64,
    /// The `_id` field of the upserted document.
    pub upserted_id: Option<Bson>,
}

impl From<BulkWriteResult> for UpdateResult {
    fn from(result: BulkWriteResult) -> Self {
        Self {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_ids.into_values().next(),
        }
    }
}

/// The result of a [`Collection::delete_one`](crate::Collection::delete_one) or
/// [`Collection::delete_many`](crate::Collection::delete_many) operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteResult {
    /// The number of documents deleted by the operation.
    pub deleted_count: u64,
}

impl From<BulkWriteResult> for DeleteResult {
    fn from(result: BulkWriteResult) -> Self {
        Self {
            deleted_count: result.deleted_count,
        }
    }
}

/// The aggregated result of a [`Collection::bulk_write`](crate::Collection::bulk_write)
/// operation. Indices refer to positions in the caller's list of write models, regardless of how
/// the writes were split into batches.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BulkWriteResult {
    /// The number of documents inserted.
    pub inserted_count: u64,
    /// The number of documents that matched the filters of update and replace operations.
    pub matched_count: u64,
    /// The number of documents modified by update and replace operations.
    pub modified_count: u64,
    /// The number of documents deleted.
    pub deleted_count: u64,
    /// The number of documents upserted.
    pub upserted_count: u64,
    /// The `_id`s of the upserted documents, keyed by the index of the write that upserted them.
    pub upserted_ids: BTreeMap<usize, Bson>,
    /// The `_id`s of the inserted documents, keyed by the index of the insert.
    pub inserted_ids: BTreeMap<usize, Bson>,
}

impl BulkWriteResult {
    /// Adds the result of a batch whose first write sits at `offset` in the caller's list.
    pub(crate) fn merge_batch(&mut self, other: BulkWriteResult, offset: usize) {
        self.inserted_count += other.inserted_count;
        self.matched_count += other.matched_count;
        self.modified_count += other.modified_count;
        self.deleted_count += other.deleted_count;
        self.upserted_count += other.upserted_count;
        self.upserted_ids.extend(
            other
                .upserted_ids
                .into_iter()
                .map(|(index, id)| (offset + index, id)),
        );
        self.inserted_ids.extend(
            other
                .inserted_ids
                .into_iter()
                .map(|(index, id)| (offset + index, id)),
        );
    }
}

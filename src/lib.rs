//! This crate contains the request-dispatch core of a MongoDB client: the logic that decides
//! which server an operation runs on, whether a failed attempt may be retried, and how a large
//! multi-document write is split into batches the server will accept.
//!
//! Connection handling, wire-message encoding and topology monitoring live outside of this crate.
//! They are plugged in through two traits:
//!
//! - [`Topology`](sdam::Topology) hands out point-in-time snapshots of the known servers and
//!   accepts requests to rescan the deployment.
//! - [`Transport`](cmap::Transport) sends a single [`Command`](cmap::Command) to a server and
//!   returns its raw reply.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use mongodb_dispatch::{cmap::Transport, sdam::Topology};
//! # async fn foo(topology: Arc<dyn Topology>, transport: Arc<dyn Transport>) -> mongodb_dispatch::error::Result<()> {
//! use mongodb_dispatch::{
//!     bson::doc,
//!     bulk_write::WriteModel,
//!     options::ClientOptions,
//!     Client,
//! };
//!
//! let client = Client::new(topology, transport, ClientOptions::default())?;
//! let coll = client.collection("mydb", "books");
//!
//! let result = coll
//!     .bulk_write(
//!         vec![
//!             WriteModel::insert_one(doc! { "title": "1984" }),
//!             WriteModel::delete_many(doc! { "author": "Anonymous" }),
//!         ],
//!         None,
//!     )
//!     .await?;
//! println!("inserted {} documents", result.inserted_count);
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//! The crate emits [`tracing`] events under the `mongodb_dispatch::server_selection`,
//! `mongodb_dispatch::retry` and `mongodb_dispatch::bulk_write` targets. Install any `tracing`
//! subscriber to see them.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use ::bson;

mod bson_util;
pub mod bulk_write;
mod client;
pub mod cmap;
mod coll;
mod collation;
mod concern;
pub mod error;
mod operation;
pub mod results;
pub mod sdam;
mod selection_criteria;
mod serde_util;
mod trace;

pub use crate::{
    client::{session::ClientSession, Client},
    coll::{Collection, Namespace},
};

/// Contains the options types used throughout the crate.
pub mod options {
    pub use crate::{
        client::options::{ClientOptions, ServerAddress, SessionOptions, TransactionOptions},
        coll::options::{
            BulkWriteOptions,
            DeleteOptions,
            FindOptions,
            InsertManyOptions,
            InsertOneOptions,
            ReplaceOptions,
            UpdateModifications,
            UpdateOptions,
        },
        collation::{Collation, CollationStrength},
        concern::{Acknowledgment, WriteConcern},
        selection_criteria::{
            Predicate,
            ReadPreference,
            ReadPreferenceOptions,
            SelectionCriteria,
            TagSet,
        },
    };
}

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{options::ServerAddress, selection_criteria::TagSet};

/// The first wire version (MongoDB 3.4) whose servers accept a collation on writes.
const COLLATION_MIN_WIRE_VERSION: i32 = 5;

/// The first wire version (MongoDB 3.6) with sessions, retryable writes and array filters.
const SESSIONS_MIN_WIRE_VERSION: i32 = 6;

pub(crate) const DEFAULT_MAX_WRITE_BATCH_SIZE: usize = 100_000;
pub(crate) const DEFAULT_MAX_BSON_OBJECT_SIZE: usize = 16 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_MESSAGE_SIZE_BYTES: usize = 48_000_000;

/// The possible roles of a server in a deployment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replica set mongod.
    Standalone,

    /// A router used in sharded deployments.
    Mongos,

    /// The primary node in a replica set.
    #[serde(rename = "RSPrimary")]
    RsPrimary,

    /// A secondary node in a replica set.
    #[serde(rename = "RSSecondary")]
    RsSecondary,

    /// A non-data bearing node in a replica set which can participate in elections.
    #[serde(rename = "RSArbiter")]
    RsArbiter,

    /// Hidden, starting up, or recovering nodes in a replica set.
    #[serde(rename = "RSOther")]
    RsOther,

    /// A member of an uninitialized replica set or a member that has been removed from the replica
    /// set config.
    #[serde(rename = "RSGhost")]
    RsGhost,

    /// A load-balancing proxy between the client and the deployment.
    LoadBalancer,

    /// A server that the client can't communicate with or whose role hasn't been determined yet.
    #[default]
    Unknown,
}

impl ServerType {
    pub(crate) fn is_data_bearing(self) -> bool {
        matches!(
            self,
            ServerType::Standalone
                | ServerType::RsPrimary
                | ServerType::RsSecondary
                | ServerType::Mongos
                | ServerType::LoadBalancer
        )
    }

    pub(crate) fn is_available(self) -> bool {
        !matches!(self, ServerType::Unknown)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An immutable snapshot of what is known about a single server. The monitor replaces a server's
/// description wholesale whenever it learns something new.
///
/// ```
/// # use std::time::Duration;
/// use mongodb_dispatch::{options::ServerAddress, sdam::{ServerDescription, ServerType}};
///
/// let description = ServerDescription::builder()
///     .address(ServerAddress::parse("a.example.com:27017")?)
///     .server_type(ServerType::RsSecondary)
///     .average_round_trip_time(Duration::from_millis(12))
///     .max_wire_version(21)
///     .build();
/// assert!(description.supports_collation());
/// # Ok::<(), mongodb_dispatch::error::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(field_defaults(default))]
#[non_exhaustive]
pub struct ServerDescription {
    #[builder(!default)]
    pub(crate) address: ServerAddress,

    pub(crate) server_type: ServerType,

    pub(crate) tags: TagSet,

    #[builder(setter(strip_option))]
    pub(crate) average_round_trip_time: Option<Duration>,

    #[builder(default = DEFAULT_MAX_WRITE_BATCH_SIZE)]
    pub(crate) max_write_batch_size: usize,

    #[builder(default = DEFAULT_MAX_BSON_OBJECT_SIZE)]
    pub(crate) max_bson_object_size: usize,

    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE_BYTES)]
    pub(crate) max_message_size_bytes: usize,

    #[builder(setter(strip_option))]
    pub(crate) set_name: Option<String>,

    #[builder(setter(strip_option))]
    pub(crate) max_wire_version: Option<i32>,

    #[builder(setter(strip_option))]
    pub(crate) logical_session_timeout: Option<Duration>,

    /// How far this secondary is estimated to lag behind the primary, as computed by the monitor.
    #[builder(setter(strip_option))]
    pub(crate) staleness: Option<Duration>,
}

impl ServerDescription {
    /// The address of the server.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// The role of the server in the deployment.
    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    /// The tags the server is configured with.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// The moving average of the time it took to run a heartbeat against the server.
    pub fn average_round_trip_time(&self) -> Option<Duration> {
        self.average_round_trip_time
    }

    /// The maximum number of writes the server accepts in one write command.
    pub fn max_write_batch_size(&self) -> usize {
        self.max_write_batch_size
    }

    /// The maximum size in bytes of a single BSON document.
    pub fn max_bson_object_size(&self) -> usize {
        self.max_bson_object_size
    }

    /// The maximum size in bytes of a wire message.
    pub fn max_message_size_bytes(&self) -> usize {
        self.max_message_size_bytes
    }

    /// The name of the replica set the server belongs to, if any.
    pub fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref()
    }

    /// The highest wire protocol version the server speaks.
    pub fn max_wire_version(&self) -> Option<i32> {
        self.max_wire_version
    }

    /// The estimated replication lag of the server.
    pub fn staleness(&self) -> Option<Duration> {
        self.staleness
    }

    /// Whether the server can associate operations with a logical session.
    pub fn supports_sessions(&self) -> bool {
        self.server_type.is_data_bearing()
            && self.logical_session_timeout.is_some()
            && self
                .max_wire_version
                .is_some_and(|version| version >= SESSIONS_MIN_WIRE_VERSION)
    }

    /// Whether writes sent to this server may be retried with a transaction number. Standalone
    /// servers have no oplog to deduplicate retried writes against.
    pub fn supports_retryable_writes(&self) -> bool {
        self.server_type != ServerType::Standalone && self.supports_sessions()
    }

    /// Whether the server accepts a collation on write statements.
    pub fn supports_collation(&self) -> bool {
        self.max_wire_version
            .is_some_and(|version| version >= COLLATION_MIN_WIRE_VERSION)
    }

    /// Whether the server accepts array filters on update statements.
    pub fn supports_array_filters(&self) -> bool {
        self.max_wire_version
            .is_some_and(|version| version >= SESSIONS_MIN_WIRE_VERSION)
    }

    pub(crate) fn is_available(&self) -> bool {
        self.server_type.is_available()
    }

    /// Whether every tag in `tag_set` is present on this server with the same value. An empty tag
    /// set matches every server.
    pub(crate) fn matches_tag_set(&self, tag_set: &TagSet) -> bool {
        tag_set
            .iter()
            .all(|(key, val)| self.tags.get(key) == Some(val))
    }
}

impl fmt::Display for ServerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Address: {}, Type: {}",
            self.address, self.server_type
        )?;
        if let Some(rtt) = self.average_round_trip_time {
            write!(f, ", Average RTT: {:?}", rtt)?;
        }
        if let Some(ref set_name) = self.set_name {
            write!(f, ", Set Name: {}", set_name)?;
        }
        if !self.tags.is_empty() {
            write!(f, ", Tags: {:?}", self.tags)?;
        }
        if let Some(max_wire_version) = self.max_wire_version {
            write!(f, ", Max Wire Version: {}", max_wire_version)?;
        }
        write!(f, " }}")
    }
}

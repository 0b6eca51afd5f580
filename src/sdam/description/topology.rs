pub(crate) mod server_selection;

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    options::ServerAddress,
    sdam::description::server::ServerDescription,
};

use self::server_selection::IDLE_WRITE_PERIOD;

pub(crate) const DEFAULT_HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(10);

/// The possible types for a topology.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize, Default, derive_more::Display,
)]
#[non_exhaustive]
pub enum TopologyType {
    /// A single mongod server.
    Single,

    /// A replica set with no primary.
    ReplicaSetNoPrimary,

    /// A replica set with a primary.
    ReplicaSetWithPrimary,

    /// A sharded topology.
    Sharded,

    /// A load balanced topology.
    LoadBalanced,

    /// A topology whose type is not known.
    #[default]
    Unknown,
}

/// A point-in-time snapshot of the deployment, as handed out by a
/// [`Topology`](crate::sdam::Topology). Server selection runs against one snapshot at a time and
/// never observes a half-applied update.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TopologyDescription {
    pub(crate) topology_type: TopologyType,
    pub(crate) set_name: Option<String>,
    pub(crate) servers: HashMap<ServerAddress, ServerDescription>,
    pub(crate) local_threshold: Option<Duration>,
    pub(crate) heartbeat_freq: Option<Duration>,
    pub(crate) compatibility_error: Option<String>,
}

impl TopologyDescription {
    /// Creates a snapshot of a topology of the given type containing `servers`.
    pub fn new(
        topology_type: TopologyType,
        servers: impl IntoIterator<Item = ServerDescription>,
    ) -> Self {
        Self {
            topology_type,
            servers: servers
                .into_iter()
                .map(|server| (server.address.clone(), server))
                .collect(),
            ..Default::default()
        }
    }

    /// Sets the name of the replica set this topology describes.
    pub fn with_set_name(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    /// Sets the width of the latency window used when choosing among suitable servers.
    pub fn with_local_threshold(mut self, local_threshold: Duration) -> Self {
        self.local_threshold = Some(local_threshold);
        self
    }

    /// Sets the interval at which the monitor checks each server.
    pub fn with_heartbeat_freq(mut self, heartbeat_freq: Duration) -> Self {
        self.heartbeat_freq = Some(heartbeat_freq);
        self
    }

    /// Marks the topology as containing a server this client cannot talk to. Selection fails
    /// immediately with the given message until the error is cleared.
    pub fn with_compatibility_error(mut self, message: impl Into<String>) -> Self {
        self.compatibility_error = Some(message.into());
        self
    }

    /// The type of the topology.
    pub fn topology_type(&self) -> TopologyType {
        self.topology_type
    }

    /// The descriptions of every server in the topology.
    pub fn servers(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values()
    }

    /// The description of the server at `address`, if it is part of the topology.
    pub fn server(&self, address: &ServerAddress) -> Option<&ServerDescription> {
        self.servers.get(address)
    }

    pub(crate) fn compatibility_error(&self) -> Option<&String> {
        self.compatibility_error.as_ref()
    }

    pub(crate) fn heartbeat_frequency(&self) -> Duration {
        self.heartbeat_freq.unwrap_or(DEFAULT_HEARTBEAT_FREQUENCY)
    }
}

impl fmt::Display for TopologyDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{{ Type: {}", self.topology_type)?;

        if let Some(ref set_name) = self.set_name {
            write!(f, ", Set Name: {}", set_name)?;
        }

        if let Some(ref compatibility_error) = self.compatibility_error {
            write!(f, ", Compatibility Error: {}", compatibility_error)?;
        }

        if !self.servers.is_empty() {
            write!(f, ", Servers: [ ")?;
            let mut iter = self.servers.values();
            if let Some(server) = iter.next() {
                write!(f, "{}", server)?;
            }
            for server in iter {
                write!(f, ", {}", server)?;
            }
            write!(f, " ]")?;
        }

        write!(f, " }}")
    }
}

/// Checks that `max_staleness` is large enough for the staleness estimates of the monitor to be
/// meaningful: at least 90 seconds, and at least one heartbeat plus the idle write period.
pub(crate) fn verify_max_staleness(
    max_staleness: Duration,
    heartbeat_frequency: Duration,
) -> Result<()> {
    let smallest_max_staleness = std::cmp::max(
        Duration::from_secs(90),
        heartbeat_frequency
            .checked_add(IDLE_WRITE_PERIOD)
            .unwrap_or(Duration::MAX),
    );

    if max_staleness < smallest_max_staleness {
        return Err(Error::invalid_argument(format!(
            "invalid max_staleness value: must be at least {} seconds",
            smallest_max_staleness.as_secs()
        )));
    }

    Ok(())
}


use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    time::Duration,
};

use serde::{de::Error as SerdeError, Deserialize, Deserializer};
use typed_builder::TypedBuilder;

use crate::{
    concern::WriteConcern,
    error::{Error, Result},
    selection_criteria::SelectionCriteria,
    serde_util,
};

pub(crate) const DEFAULT_PORT: u16 = 27017;

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_READ_RETRY_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// An enum representing the address of a MongoDB server.
#[derive(Clone, Debug, Eq)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address where the MongoDB server can be found.
        host: String,

        /// The TCP port that the MongoDB server is listening on.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl<'de> Deserialize<'de> for ServerAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(s.as_str()).map_err(|e| D::Error::custom(format!("{}", e)))
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Tcp { host, port },
                Self::Tcp {
                    host: other_host,
                    port: other_port,
                },
            ) => {
                host == other_host
                    && port.unwrap_or(DEFAULT_PORT) == other_port.unwrap_or(DEFAULT_PORT)
            }
        }
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        match self {
            Self::Tcp { host, port } => {
                host.hash(state);
                port.unwrap_or(DEFAULT_PORT).hash(state);
            }
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(address: &str) -> Result<Self> {
        ServerAddress::parse(address)
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`. Hostnames are normalized to lowercase.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let invalid = || Error::invalid_argument(format!("invalid server address: {address}"));

        let mut parts = address.split(':');
        let hostname = match parts.next() {
            Some(part) if !part.is_empty() => part,
            _ => return Err(invalid()),
        };

        let port = match parts.next() {
            Some(part) => {
                let port = u16::from_str(part).map_err(|_| invalid())?;
                if port == 0 || parts.next().is_some() {
                    return Err(invalid());
                }
                Some(port)
            }
            None => None,
        };

        Ok(ServerAddress::Tcp {
            host: hostname.to_lowercase(),
            port,
        })
    }

    /// The hostname of the address.
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port of the address, if one was given.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => *port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => {
                write!(fmt, "{}:{}", host, port.unwrap_or(DEFAULT_PORT))
            }
        }
    }
}

/// Contains the options that can be used to create a new [`Client`](../struct.Client.html).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ClientOptions {
    /// Whether reads that fail with a transient error should be retried once the deployment has
    /// been rescanned.
    ///
    /// The default value is true.
    pub retry_reads: Option<bool>,

    /// Whether writes that fail with a transient error should be retried.
    ///
    /// The default value is true.
    pub retry_writes: Option<bool>,

    /// The total number of attempts, including the first, made for a retryable read.
    ///
    /// The default value is 2.
    pub max_read_attempts: Option<u32>,

    /// The total number of attempts, including the first, made for a retryable write.
    ///
    /// The default value is 2.
    pub max_write_attempts: Option<u32>,

    /// How long to wait before retrying a read.
    ///
    /// The default value is 100 ms.
    #[serde(
        rename = "readRetryDelayMS",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub read_retry_delay: Option<Duration>,

    /// The width of the latency window: among the suitable servers, only those whose average
    /// round trip time is within this amount of the fastest one are chosen from.
    ///
    /// The default value is 15 ms.
    #[serde(
        rename = "localThresholdMS",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub local_threshold: Option<Duration>,

    /// How long an operation waits for a suitable server to become available before failing.
    ///
    /// The default value is 30 seconds.
    #[serde(
        rename = "serverSelectionTimeoutMS",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub server_selection_timeout: Option<Duration>,

    /// The interval at which the monitor checks each server. Max staleness values must allow for
    /// at least one heartbeat.
    ///
    /// The default value is 10 seconds.
    #[serde(
        rename = "heartbeatFrequencyMS",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub heartbeat_freq: Option<Duration>,

    /// The write concern applied to writes that don't specify their own.
    pub write_concern: Option<WriteConcern>,

    /// The criteria used to route operations that don't specify their own.
    ///
    /// The default is to route every operation to the primary.
    #[serde(rename = "readPreference")]
    pub selection_criteria: Option<SelectionCriteria>,
}

impl ClientOptions {
    pub(crate) fn retry_reads(&self) -> bool {
        self.retry_reads != Some(false)
    }

    pub(crate) fn retry_writes(&self) -> bool {
        self.retry_writes != Some(false)
    }

    pub(crate) fn max_read_attempts(&self) -> u32 {
        self.max_read_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub(crate) fn max_write_attempts(&self) -> u32 {
        self.max_write_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub(crate) fn read_retry_delay(&self) -> Duration {
        self.read_retry_delay.unwrap_or(DEFAULT_READ_RETRY_DELAY)
    }

    pub(crate) fn server_selection_timeout(&self) -> Duration {
        self.server_selection_timeout
            .unwrap_or(DEFAULT_SERVER_SELECTION_TIMEOUT)
    }

    /// Checks that the options are consistent with each other.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }
        if self.max_read_attempts == Some(0) || self.max_write_attempts == Some(0) {
            return Err(Error::invalid_argument(
                "the maximum number of attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Contains the options that can be used to create a new
/// [`ClientSession`](crate::ClientSession).
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionOptions {
    /// Overrides the client's `retry_writes` setting for writes run with this session.
    pub retry_writes: Option<bool>,

    /// The default options to use for transactions started on this session.
    ///
    /// If these options are not specified, they will be inherited from the
    /// [`Client`](../struct.Client.html) associated with this session.
    pub default_transaction_options: Option<TransactionOptions>,
}

/// Contains the options that can be used for a transaction.
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TransactionOptions {
    /// The write concern to use when committing or aborting a transaction.
    pub write_concern: Option<WriteConcern>,

    /// The selection criteria to use for all read operations in a transaction.
    #[serde(rename = "readPreference")]
    pub selection_criteria: Option<SelectionCriteria>,
}

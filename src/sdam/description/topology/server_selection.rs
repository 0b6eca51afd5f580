
use std::time::Duration;

use rand::seq::IndexedRandom;

use super::{verify_max_staleness, TopologyDescription, TopologyType};
use crate::{
    error::{Error, Result},
    options::ServerAddress,
    sdam::description::server::{ServerDescription, ServerType},
    selection_criteria::{ReadPreference, SelectionCriteria, TagSet},
};

pub(crate) const DEFAULT_LOCAL_THRESHOLD: Duration = Duration::from_millis(15);
pub(crate) const IDLE_WRITE_PERIOD: Duration = Duration::from_secs(10);

/// Selects the servers among `candidates` that are suitable for `read_preference`, following the
/// replica set rules:
///
/// - `Primary` yields the primary, if any. Tags and max staleness never apply to it.
/// - `PrimaryPreferred` yields the primary if there is one, and otherwise behaves like
///   `Secondary`.
/// - `Secondary` yields the secondaries that pass the max staleness filter and the first tag set
///   that matches any of them, narrowed to the latency window.
/// - `SecondaryPreferred` behaves like `Secondary`, falling back to the primary if no secondary
///   is suitable.
/// - `Nearest` behaves like `Secondary` over the primary and the secondaries together.
///
/// The latency window keeps every server whose average round trip time is within
/// `local_threshold` of the fastest remaining server.
///
/// This never fails. An empty result means no suitable server is known yet.
pub fn select<'a>(
    candidates: impl IntoIterator<Item = &'a ServerDescription>,
    read_preference: &ReadPreference,
    local_threshold: Duration,
) -> Vec<&'a ServerDescription> {
    let candidates: Vec<&ServerDescription> = candidates.into_iter().collect();
    let primary = || -> Vec<&'a ServerDescription> {
        candidates
            .iter()
            .copied()
            .filter(|server| server.server_type == ServerType::RsPrimary)
            .take(1)
            .collect()
    };
    let eligible = |types: &[ServerType]| -> Vec<&'a ServerDescription> {
        let mut servers: Vec<&ServerDescription> = candidates
            .iter()
            .copied()
            .filter(|server| types.contains(&server.server_type))
            .collect();

        if let Some(max_staleness) = read_preference
            .max_staleness()
            .filter(|max_staleness| !max_staleness.is_zero())
        {
            filter_servers_by_max_staleness(&mut servers, max_staleness);
        }
        if let Some(tag_sets) = read_preference.tag_sets() {
            filter_servers_by_tag_sets(&mut servers, tag_sets);
        }
        retain_servers_within_latency_window(&mut servers, local_threshold);

        servers
    };

    match read_preference {
        ReadPreference::Primary => primary(),
        ReadPreference::Secondary { .. } => eligible(&[ServerType::RsSecondary]),
        ReadPreference::PrimaryPreferred { .. } => {
            let primary = primary();
            if primary.is_empty() {
                eligible(&[ServerType::RsSecondary])
            } else {
                primary
            }
        }
        ReadPreference::SecondaryPreferred { .. } => {
            let secondaries = eligible(&[ServerType::RsSecondary]);
            if secondaries.is_empty() {
                primary()
            } else {
                secondaries
            }
        }
        ReadPreference::Nearest { .. } => {
            eligible(&[ServerType::RsPrimary, ServerType::RsSecondary])
        }
    }
}

/// Attempt to select a server, returning None if no server could be selected
/// that matched the provided criteria.
///
/// On sharded topologies, the routers in `deprioritized` are only chosen if no other router is
/// suitable.
pub(crate) fn attempt_to_select_server(
    criteria: &SelectionCriteria,
    topology_description: &TopologyDescription,
    deprioritized: &[ServerAddress],
) -> Result<Option<ServerDescription>> {
    let mut in_window = topology_description.suitable_servers_in_latency_window(criteria)?;
    if topology_description.topology_type == TopologyType::Sharded
        && !deprioritized.is_empty()
        && in_window.len() > 1
    {
        let preferred: Vec<&ServerDescription> = in_window
            .iter()
            .copied()
            .filter(|server| !deprioritized.contains(&server.address))
            .collect();
        if !preferred.is_empty() {
            in_window = preferred;
        }
    }

    Ok(in_window.choose(&mut rand::rng()).map(|server| (*server).clone()))
}

impl TopologyDescription {
    pub(crate) fn server_selection_timeout_error_message(
        &self,
        criteria: &SelectionCriteria,
    ) -> String {
        if self.has_available_servers() {
            format!(
                "Server selection timeout: None of the available servers suitable for criteria \
                 {:?}. Topology: {}",
                criteria, self
            )
        } else {
            format!(
                "Server selection timeout: No available servers. Topology: {}",
                self
            )
        }
    }

    pub(crate) fn suitable_servers_in_latency_window<'a>(
        &'a self,
        criteria: &'a SelectionCriteria,
    ) -> Result<Vec<&'a ServerDescription>> {
        if let Some(message) = self.compatibility_error() {
            return Err(Error::server_selection(message.clone()));
        }

        let mut suitable_servers = match criteria {
            SelectionCriteria::ReadPreference(ref read_pref) => self.suitable_servers(read_pref)?,
            SelectionCriteria::Predicate(ref predicate) => self
                .servers
                .values()
                .filter(|s| {
                    // A direct connection may target a server of any role.
                    ((self.topology_type == TopologyType::Single && s.is_available())
                        || s.server_type.is_data_bearing())
                        && predicate(s)
                })
                .collect(),
        };

        retain_servers_within_latency_window(&mut suitable_servers, self.local_threshold());

        Ok(suitable_servers)
    }

    pub(crate) fn has_available_servers(&self) -> bool {
        self.servers.values().any(|server| server.is_available())
    }

    pub(crate) fn local_threshold(&self) -> Duration {
        self.local_threshold.unwrap_or(DEFAULT_LOCAL_THRESHOLD)
    }

    fn suitable_servers(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<Vec<&ServerDescription>> {
        let servers = match self.topology_type {
            TopologyType::Unknown => Vec::new(),
            TopologyType::Single | TopologyType::LoadBalanced => self
                .servers
                .values()
                .filter(|server| server.is_available())
                .collect(),
            TopologyType::Sharded => self.servers_with_type(&[ServerType::Mongos]).collect(),
            TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => {
                if let Some(max_staleness) = read_preference
                    .max_staleness()
                    .filter(|max_staleness| !max_staleness.is_zero())
                {
                    verify_max_staleness(max_staleness, self.heartbeat_frequency())?;
                }
                select(self.servers.values(), read_preference, self.local_threshold())
            }
        };

        Ok(servers)
    }

    pub(crate) fn servers_with_type<'a>(
        &'a self,
        types: &'a [ServerType],
    ) -> impl Iterator<Item = &'a ServerDescription> {
        self.servers
            .values()
            .filter(move |server| types.contains(&server.server_type))
    }
}

fn retain_servers_within_latency_window(
    suitable_servers: &mut Vec<&ServerDescription>,
    local_threshold: Duration,
) {
    let shortest_average_rtt = suitable_servers
        .iter()
        .filter_map(|server_desc| server_desc.average_round_trip_time)
        .min();

    let max_rtt_within_window = match shortest_average_rtt {
        Some(rtt) => rtt.checked_add(local_threshold).unwrap_or(Duration::MAX),
        None => return,
    };

    suitable_servers.retain(move |server_desc| match server_desc.average_round_trip_time {
        Some(server_rtt) => server_rtt <= max_rtt_within_window,
        // Load balancers aren't monitored, so they have no RTT.
        None => server_desc.server_type == ServerType::LoadBalancer,
    });
}

/// Only secondaries are ever stale. A secondary whose staleness the monitor could not estimate is
/// treated as too stale.
fn filter_servers_by_max_staleness(servers: &mut Vec<&ServerDescription>, max_staleness: Duration) {
    servers.retain(|server| {
        server.server_type != ServerType::RsSecondary
            || server
                .staleness
                .is_some_and(|staleness| staleness <= max_staleness)
    });
}

fn filter_servers_by_tag_sets(servers: &mut Vec<&ServerDescription>, tag_sets: &[TagSet]) {
    if tag_sets.is_empty() {
        return;
    }

    for tag_set in tag_sets {
        let matches_tag_set = |server: &&ServerDescription| server.matches_tag_set(tag_set);

        if servers.iter().any(matches_tag_set) {
            servers.retain(matches_tag_set);

            return;
        }
    }

    servers.clear();
}

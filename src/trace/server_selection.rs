use std::time::Duration;

use tokio::time::Instant;

use super::{TracingRepresentation, SERVER_SELECTION_TRACING_EVENT_TARGET};
use crate::{
    error::Error,
    sdam::{ServerDescription, TopologyDescription},
    selection_criteria::SelectionCriteria,
};

/// Type responsible for emitting server selection tracing events.
pub(crate) struct ServerSelectionEventEmitter<'a> {
    criteria: &'a SelectionCriteria,
    operation_name: &'a str,
    start_time: Instant,
    timeout: Duration,
}

impl ServerSelectionEventEmitter<'_> {
    pub(crate) fn new<'a>(
        criteria: &'a SelectionCriteria,
        operation_name: &'a str,
        start_time: Instant,
        timeout: Duration,
    ) -> ServerSelectionEventEmitter<'a> {
        ServerSelectionEventEmitter::<'a> {
            criteria,
            operation_name,
            start_time,
            timeout,
        }
    }

    pub(crate) fn emit_started_event(&self, topology_description: &TopologyDescription) {
        if tracing::enabled!(target: SERVER_SELECTION_TRACING_EVENT_TARGET, tracing::Level::DEBUG) {
            tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                operation = self.operation_name,
                selector = self.criteria.tracing_representation(),
                topologyDescription = topology_description.tracing_representation(),
                "Server selection started"
            );
        }
    }

    pub(crate) fn emit_failed_event(
        &self,
        topology_description: &TopologyDescription,
        error: &Error,
    ) {
        if tracing::enabled!(target: SERVER_SELECTION_TRACING_EVENT_TARGET, tracing::Level::DEBUG) {
            tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                operation = self.operation_name,
                selector = self.criteria.tracing_representation(),
                topologyDescription = topology_description.tracing_representation(),
                failure = error.tracing_representation(),
                "Server selection failed"
            );
        }
    }

    pub(crate) fn emit_succeeded_event(
        &self,
        topology_description: &TopologyDescription,
        server: &ServerDescription,
    ) {
        if tracing::enabled!(target: SERVER_SELECTION_TRACING_EVENT_TARGET, tracing::Level::DEBUG) {
            tracing::debug!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                operation = self.operation_name,
                selector = self.criteria.tracing_representation(),
                topologyDescription = topology_description.tracing_representation(),
                serverHost = server.address().host(),
                serverPort = server.address().port(),
                "Server selection succeeded"
            );
        }
    }

    pub(crate) fn emit_waiting_event(&self, topology_description: &TopologyDescription) {
        if tracing::enabled!(target: SERVER_SELECTION_TRACING_EVENT_TARGET, tracing::Level::INFO) {
            let remaining_time = self
                .timeout
                .checked_sub(self.start_time.elapsed())
                .unwrap_or(Duration::ZERO);
            tracing::info!(
                target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                operation = self.operation_name,
                selector = self.criteria.tracing_representation(),
                topologyDescription = topology_description.tracing_representation(),
                remainingTimeMS = remaining_time.as_millis(),
                "Waiting for suitable server to become available",
            );
        }
    }
}

use crate::{
    bson::{Bson, Document},
    error::Error,
    options::ServerAddress,
    sdam::TopologyDescription,
    selection_criteria::SelectionCriteria,
};

pub(crate) mod server_selection;

pub(crate) const SERVER_SELECTION_TRACING_EVENT_TARGET: &str =
    "mongodb_dispatch::server_selection";
pub(crate) const RETRY_TRACING_EVENT_TARGET: &str = "mongodb_dispatch::retry";
pub(crate) const BULK_WRITE_TRACING_EVENT_TARGET: &str = "mongodb_dispatch::bulk_write";

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string()
    }
}

impl TracingRepresentation for Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for SelectionCriteria {
    type Representation = String;

    fn tracing_representation(&self) -> Self::Representation {
        self.to_string()
    }
}

impl TracingRepresentation for TopologyDescription {
    type Representation = String;

    fn tracing_representation(&self) -> Self::Representation {
        self.to_string()
    }
}

impl TracingRepresentation for ServerAddress {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

//! Contains the read surface of the topology: immutable server descriptions, a snapshot of the
//! deployment, and the [`Topology`] trait through which the monitor that maintains them is
//! consulted.

mod description;
mod topology;

pub use self::{
    description::{
        server::{ServerDescription, ServerType},
        topology::{server_selection::select, TopologyDescription, TopologyType},
    },
    topology::Topology,
};

pub(crate) use self::description::topology::server_selection::attempt_to_select_server;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use futures_core::future::BoxFuture;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, Transport},
    error::{Error, Result},
    options::{ClientOptions, ServerAddress},
    sdam::{ServerDescription, ServerType, Topology, TopologyDescription, TopologyType},
    Client,
};

/// A topology whose snapshot is set by the test. Rescan requests are only counted.
#[derive(Debug)]
pub(crate) struct MockTopology {
    description: Mutex<TopologyDescription>,
    rescans: AtomicUsize,
}

impl MockTopology {
    pub(crate) fn new(description: TopologyDescription) -> Arc<Self> {
        Arc::new(Self {
            description: Mutex::new(description),
            rescans: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_description(&self, description: TopologyDescription) {
        *self.description.lock().unwrap() = description;
    }

    pub(crate) fn rescans(&self) -> usize {
        self.rescans.load(Ordering::SeqCst)
    }
}

impl Topology for MockTopology {
    fn description(&self) -> TopologyDescription {
        self.description.lock().unwrap().clone()
    }

    fn request_update(&self) {
        self.rescans.fetch_add(1, Ordering::SeqCst);
    }
}

type Responder = Box<dyn Fn(&Command) -> Result<Document> + Send + Sync>;

/// A transport that records every command it is given. Replies queued with
/// [`MockTransport::push_reply`] are handed out first, then the responder is consulted.
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Result<Document>>>,
    responder: Responder,
    commands: Mutex<Vec<(ServerAddress, Command)>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_responder(|_| Ok(doc! { "ok": 1 }))
    }

    pub(crate) fn with_responder(
        responder: impl Fn(&Command) -> Result<Document> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn push_reply(&self, reply: Result<Document>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn commands(&self) -> Vec<(ServerAddress, Command)> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn command_bodies(&self) -> Vec<Document> {
        self.commands()
            .into_iter()
            .map(|(_, command)| command.body)
            .collect()
    }
}

impl Transport for MockTransport {
    fn send_command<'a>(
        &'a self,
        server: &'a ServerDescription,
        command: Command,
    ) -> BoxFuture<'a, Result<RawCommandResponse>> {
        let queued = self.replies.lock().unwrap().pop_front();
        let reply = queued.unwrap_or_else(|| (self.responder)(&command));
        self.commands
            .lock()
            .unwrap()
            .push((server.address().clone(), command));

        let address = server.address().clone();
        Box::pin(async move { reply.map(|reply| RawCommandResponse::new(address, reply)) })
    }
}

pub(crate) fn address(address: &str) -> ServerAddress {
    ServerAddress::parse(address).unwrap()
}

/// A data-bearing server with sessions, retryable writes, collation and array filters.
pub(crate) fn server(address: &str, server_type: ServerType) -> ServerDescription {
    ServerDescription::builder()
        .address(self::address(address))
        .server_type(server_type)
        .average_round_trip_time(Duration::from_millis(5))
        .max_wire_version(21)
        .logical_session_timeout(Duration::from_secs(30 * 60))
        .build()
}

pub(crate) fn replica_set(
    servers: impl IntoIterator<Item = ServerDescription>,
) -> TopologyDescription {
    TopologyDescription::new(TopologyType::ReplicaSetWithPrimary, servers).with_set_name("rs")
}

pub(crate) fn primary_only() -> TopologyDescription {
    replica_set([server("a:27017", ServerType::RsPrimary)])
}

pub(crate) fn network_error() -> Error {
    Error::from(std::io::ErrorKind::ConnectionReset)
}

pub(crate) fn command_failure(code: i32, code_name: &str, labels: &[&str]) -> Document {
    doc! {
        "ok": 0,
        "code": code,
        "codeName": code_name,
        "errmsg": format!("{} failure", code_name),
        "errorLabels": labels.iter().map(|label| label.to_string()).collect::<Vec<_>>(),
    }
}

pub(crate) struct TestClient {
    pub(crate) client: Client,
    pub(crate) topology: Arc<MockTopology>,
    pub(crate) transport: Arc<MockTransport>,
}

impl TestClient {
    pub(crate) fn new(description: TopologyDescription, options: ClientOptions) -> Self {
        Self::with_transport(description, MockTransport::new(), options)
    }

    pub(crate) fn with_transport(
        description: TopologyDescription,
        transport: Arc<MockTransport>,
        options: ClientOptions,
    ) -> Self {
        let topology = MockTopology::new(description);
        let client = Client::new(topology.clone(), transport.clone(), options).unwrap();
        Self {
            client,
            topology,
            transport,
        }
    }
}

//! Shared utilities for integration testing.
//!
//! `TestPolicyServer` is a real in-process decision server: a tarpc
//! `PolicyService` on the main rail plus an events listener that connects an
//! `EventSinkClient` back into the daemon's subscriber, exactly like the
//! production counterpart. No transport mocks.

#![allow(dead_code)] // Not every test file uses every helper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tarpc::client::{self, NewClient};
use tarpc::serde_transport;
use tarpc::server::{BaseChannel, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::codec::LengthDelimitedCodec;

use netsentinel::conn::ConnectionDescription;
use netsentinel::proto::{
    EventSinkClient, Notification, OperatorSpec, PingReply, PingRequest, PolicyError,
    PolicyService, RuleSpec,
};

/// How the server answers decision requests.
#[derive(Debug, Clone, Copy)]
pub enum AskMode {
    /// Reply with a well-formed deny/30s rule.
    Answer,
    /// Reply with a rule the daemon cannot decode.
    Malformed,
    /// Refuse with a policy error.
    Refuse,
}

/// Programmable server behavior, adjustable mid-test.
pub struct Behavior {
    /// Added to the echoed ping id; 0 behaves correctly.
    pub pong_offset: AtomicU64,
    /// Delay before answering an ask.
    pub ask_delay_ms: AtomicU64,
    pub ask_mode: Mutex<AskMode>,
    pub asks_seen: AtomicU64,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            pong_offset: AtomicU64::new(0),
            ask_delay_ms: AtomicU64::new(0),
            ask_mode: Mutex::new(AskMode::Answer),
            asks_seen: AtomicU64::new(0),
        }
    }
}

impl Behavior {
    pub fn set_ask_mode(&self, mode: AskMode) {
        *self.ask_mode.lock().unwrap() = mode;
    }
}

pub fn answer_spec() -> RuleSpec {
    RuleSpec {
        name: "server-verdict".to_string(),
        enabled: true,
        action: "deny".to_string(),
        duration: "30s".to_string(),
        operator: OperatorSpec {
            kind: "simple".to_string(),
            operand: "dest.host".to_string(),
            data: "example.com".to_string(),
        },
    }
}

#[derive(Clone)]
struct PolicyServer {
    behavior: Arc<Behavior>,
}

impl PolicyService for PolicyServer {
    async fn ping(self, _: tarpc::context::Context, req: PingRequest) -> PingReply {
        let offset = self.behavior.pong_offset.load(Ordering::SeqCst);
        PingReply {
            id: req.id.wrapping_add(offset),
        }
    }

    async fn ask_rule(
        self,
        _: tarpc::context::Context,
        _conn: ConnectionDescription,
    ) -> Result<RuleSpec, PolicyError> {
        self.behavior.asks_seen.fetch_add(1, Ordering::SeqCst);
        let delay = self.behavior.ask_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mode = *self.behavior.ask_mode.lock().unwrap();
        match mode {
            AskMode::Answer => Ok(answer_spec()),
            AskMode::Malformed => Ok(RuleSpec {
                name: "garbled".to_string(),
                enabled: true,
                action: "permit".to_string(),
                duration: "2 fortnights".to_string(),
                operator: OperatorSpec::default(),
            }),
            AskMode::Refuse => Err(PolicyError::NoVerdict("dialog dismissed".to_string())),
        }
    }
}

type TaskList = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// A running decision server the daemon under test talks to.
pub struct TestPolicyServer {
    /// Main (decision) rail address.
    pub addr: String,
    /// Events (push) rail address.
    pub events_addr: String,
    pub behavior: Arc<Behavior>,
    /// Total events-rail connections ever accepted.
    pub events_connections: Arc<AtomicU64>,
    /// Events-rail connections currently open.
    pub events_active: Arc<AtomicU64>,
    events_clients: Arc<Mutex<Vec<EventSinkClient>>>,
    tasks: TaskList,
}

impl TestPolicyServer {
    /// Start on fresh ephemeral TCP ports.
    pub async fn start_tcp() -> Self {
        Self::start_tcp_at("127.0.0.1:0", "127.0.0.1:0").await
    }

    /// Start on the given TCP addresses. Binding a previous instance's
    /// addresses simulates a server restart at the same place.
    pub async fn start_tcp_at(bind: &str, events_bind: &str) -> Self {
        let mut server = Self::empty();
        server.addr = server.spawn_main_tcp(bind).await;
        server.events_addr = server.spawn_events_tcp(events_bind).await;
        server
    }

    /// Start on unix sockets under the given directory.
    pub async fn start_unix(dir: &std::path::Path) -> Self {
        let mut server = Self::empty();
        let main_path = dir.join("policyd.sock");
        let events_path = dir.join("policyd.sock.events");
        server.spawn_main_unix(&main_path);
        server.spawn_events_unix(&events_path);
        server.addr = format!("unix://{}", main_path.display());
        server.events_addr = format!("unix://{}", events_path.display());
        server
    }

    fn empty() -> Self {
        Self {
            addr: String::new(),
            events_addr: String::new(),
            behavior: Arc::new(Behavior::default()),
            events_connections: Arc::new(AtomicU64::new(0)),
            events_active: Arc::new(AtomicU64::new(0)),
            events_clients: Arc::new(Mutex::new(Vec::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn spawn_main_tcp(&self, bind: &str) -> String {
        let mut listener = serde_transport::tcp::listen(bind, Bincode::default)
            .await
            .expect("bind main rail");
        let addr = listener.local_addr().to_string();
        let behavior = Arc::clone(&self.behavior);
        let tasks = Arc::clone(&self.tasks);
        let accept = tokio::spawn({
            let tasks = Arc::clone(&self.tasks);
            async move {
                while let Some(accepted) = listener.next().await {
                    let Ok(transport) = accepted else { continue };
                    let policy = PolicyServer {
                        behavior: Arc::clone(&behavior),
                    };
                    let conn = tokio::spawn(
                        BaseChannel::with_defaults(transport)
                            .execute(policy.serve())
                            .for_each(|response| async {
                                tokio::spawn(response);
                            }),
                    );
                    tasks.lock().unwrap().push(conn);
                }
            }
        });
        tasks.lock().unwrap().push(accept);
        addr
    }

    async fn spawn_events_tcp(&self, bind: &str) -> String {
        let mut listener = serde_transport::tcp::listen(bind, Bincode::default)
            .await
            .expect("bind events rail");
        let addr = listener.local_addr().to_string();
        let events_clients = Arc::clone(&self.events_clients);
        let events_connections = Arc::clone(&self.events_connections);
        let events_active = Arc::clone(&self.events_active);
        let tasks = Arc::clone(&self.tasks);
        let accept = tokio::spawn({
            let tasks = Arc::clone(&self.tasks);
            async move {
                while let Some(accepted) = listener.next().await {
                    let Ok(transport) = accepted else { continue };
                    events_connections.fetch_add(1, Ordering::SeqCst);
                    events_active.fetch_add(1, Ordering::SeqCst);
                    let NewClient { client, dispatch } =
                        EventSinkClient::new(client::Config::default(), transport);
                    let active = Arc::clone(&events_active);
                    let conn = tokio::spawn(async move {
                        let _ = dispatch.await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                    events_clients.lock().unwrap().push(client);
                    tasks.lock().unwrap().push(conn);
                }
            }
        });
        tasks.lock().unwrap().push(accept);
        addr
    }

    fn spawn_main_unix(&self, path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).expect("bind main rail");
        let behavior = Arc::clone(&self.behavior);
        let tasks = Arc::clone(&self.tasks);
        let accept = tokio::spawn({
            let tasks = Arc::clone(&self.tasks);
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let framed = LengthDelimitedCodec::builder().new_framed(stream);
                    let transport = serde_transport::new(framed, Bincode::default());
                    let policy = PolicyServer {
                        behavior: Arc::clone(&behavior),
                    };
                    let conn = tokio::spawn(
                        BaseChannel::with_defaults(transport)
                            .execute(policy.serve())
                            .for_each(|response| async {
                                tokio::spawn(response);
                            }),
                    );
                    tasks.lock().unwrap().push(conn);
                }
            }
        });
        tasks.lock().unwrap().push(accept);
    }

    fn spawn_events_unix(&self, path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).expect("bind events rail");
        let events_clients = Arc::clone(&self.events_clients);
        let events_connections = Arc::clone(&self.events_connections);
        let events_active = Arc::clone(&self.events_active);
        let tasks = Arc::clone(&self.tasks);
        let accept = tokio::spawn({
            let tasks = Arc::clone(&self.tasks);
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let framed = LengthDelimitedCodec::builder().new_framed(stream);
                    let transport = serde_transport::new(framed, Bincode::default());
                    events_connections.fetch_add(1, Ordering::SeqCst);
                    events_active.fetch_add(1, Ordering::SeqCst);
                    let NewClient { client, dispatch } =
                        EventSinkClient::new(client::Config::default(), transport);
                    let active = Arc::clone(&events_active);
                    let conn = tokio::spawn(async move {
                        let _ = dispatch.await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                    events_clients.lock().unwrap().push(client);
                    tasks.lock().unwrap().push(conn);
                }
            }
        });
        tasks.lock().unwrap().push(accept);
    }

    /// Push a notification through the newest events connection.
    pub async fn push(&self, notification: Notification) -> bool {
        let client = self.events_clients.lock().unwrap().last().cloned();
        match client {
            Some(client) => client
                .notify(tarpc::context::current(), notification)
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Kill the server: stop accepting and sever every open connection, as
    /// a crashed or restarted server would.
    pub fn stop(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.events_clients.lock().unwrap().clear();
    }
}

impl Drop for TestPolicyServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Poll until `predicate` holds or `deadline` elapses.
pub async fn wait_until<F>(deadline: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    predicate()
}

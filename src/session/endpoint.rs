//! Decision-server endpoint addressing and dialing.
//!
//! Endpoints come in two flavors: a unix-domain socket (given as
//! `unix:///path` or a bare absolute path) for the common local deployment,
//! and `host:port` for operator-controlled networks. Neither carries
//! transport encryption; the trust boundary is the machine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tarpc::client::{self, NewClient};
use tarpc::serde_transport;
use tarpc::tokio_serde::formats::Bincode;
use tokio::net::UnixStream;
use tokio_util::codec::LengthDelimitedCodec;

use crate::proto::PolicyServiceClient;
use crate::session::state::SessionHandle;
use crate::session::SessionError;

/// Where the decision server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix-domain socket path.
    Unix(PathBuf),
    /// `host:port` network address.
    Net(String),
}

impl Endpoint {
    /// Normalize an address string. `unix://` prefixes and bare absolute
    /// paths select unix addressing; everything else is `host:port`.
    pub fn parse(address: &str) -> Self {
        if let Some(path) = address.strip_prefix("unix://") {
            Endpoint::Unix(PathBuf::from(path))
        } else if address.starts_with('/') {
            Endpoint::Unix(PathBuf::from(address))
        } else {
            Endpoint::Net(address.to_string())
        }
    }

    /// The push-notification rail paired with this endpoint: `<path>.events`
    /// for unix sockets, port + 1 for network addresses. Used when the
    /// config does not name an events address explicitly.
    pub fn events_rail(&self) -> Self {
        match self {
            Endpoint::Unix(path) => {
                let mut events = path.as_os_str().to_os_string();
                events.push(".events");
                Endpoint::Unix(PathBuf::from(events))
            }
            Endpoint::Net(addr) => {
                match addr
                    .rsplit_once(':')
                    .and_then(|(host, port)| port.parse::<u16>().ok().map(|p| (host, p)))
                {
                    Some((host, port)) => Endpoint::Net(format!("{}:{}", host, port.wrapping_add(1))),
                    None => Endpoint::Net(addr.clone()),
                }
            }
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Endpoint::Unix(_))
    }

    /// Dial the decision rail and bind a policy client to the fresh
    /// connection. The tarpc dispatch task is spawned here and its handle
    /// travels with the session handle: its liveness is the transport-level
    /// readiness every status check derives from.
    pub(crate) async fn dial_policy(&self, dial_timeout: Duration) -> Result<SessionHandle, SessionError> {
        match self {
            Endpoint::Net(addr) => {
                let transport = tokio::time::timeout(
                    dial_timeout,
                    tarpc::serde_transport::tcp::connect(addr, Bincode::default),
                )
                .await
                .map_err(|_| SessionError::DialTimeout)??;

                let NewClient { client, dispatch } =
                    PolicyServiceClient::new(client::Config::default(), transport);
                let dispatch = tokio::spawn(async move {
                    if let Err(e) = dispatch.await {
                        tracing::debug!(error = ?e, "Policy rpc dispatch terminated");
                    }
                });
                Ok(SessionHandle::new(client, dispatch))
            }
            Endpoint::Unix(path) => {
                let stream = tokio::time::timeout(dial_timeout, UnixStream::connect(path))
                    .await
                    .map_err(|_| SessionError::DialTimeout)??;
                let framed = LengthDelimitedCodec::builder().new_framed(stream);
                let transport = serde_transport::new(framed, Bincode::default());

                let NewClient { client, dispatch } =
                    PolicyServiceClient::new(client::Config::default(), transport);
                let dispatch = tokio::spawn(async move {
                    if let Err(e) = dispatch.await {
                        tracing::debug!(error = ?e, "Policy rpc dispatch terminated");
                    }
                });
                Ok(SessionHandle::new(client, dispatch))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Net(addr) => write!(f, "{}", addr),
        }
    }
}

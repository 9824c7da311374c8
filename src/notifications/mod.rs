//! Inbound notification stream from the decision server.
//!
//! # Responsibilities
//! - Open the events rail after each successful (re)connect
//! - Host the `EventSink` callback service the server pushes into
//! - Forward notifications, in server send order, to the daemon
//!
//! # Design Decisions
//! - The stream is never retried on its own: a dead events channel is
//!   recovered by the next full reconnect cycle, which spawns a fresh
//!   subscriber
//! - The task is owned by the reconnector and aborted when the session that
//!   started it is torn down, so two subscribers never serve one session

use std::io;
use std::sync::Arc;

use futures::StreamExt;
use tarpc::serde_transport;
use tarpc::server::{BaseChannel, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::LengthDelimitedCodec;

use crate::proto::{EventSink, Notification};
use crate::session::Endpoint;
use crate::stats::Statistics;

/// Handler the server's pushes land in; forwards into the daemon's channel.
#[derive(Clone)]
struct SinkServer {
    tx: mpsc::UnboundedSender<Notification>,
    stats: Arc<Statistics>,
}

impl EventSink for SinkServer {
    async fn notify(self, _: tarpc::context::Context, notification: Notification) {
        self.stats.record_notification();
        tracing::debug!(
            id = notification.id,
            kind = ?notification.kind,
            "Notification received"
        );
        let _ = self.tx.send(notification);
    }
}

/// Spawn the subscriber task for one connected period.
pub(crate) fn spawn_subscriber(
    endpoint: Endpoint,
    tx: mpsc::UnboundedSender<Notification>,
    stats: Arc<Statistics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match serve(endpoint, tx, stats).await {
            Ok(()) => tracing::debug!("Notification stream closed"),
            Err(e) => tracing::warn!(error = %e, "Notification stream failed"),
        }
    })
}

async fn serve(
    endpoint: Endpoint,
    tx: mpsc::UnboundedSender<Notification>,
    stats: Arc<Statistics>,
) -> io::Result<()> {
    let handler = SinkServer { tx, stats };
    match endpoint {
        Endpoint::Net(addr) => {
            let transport =
                tarpc::serde_transport::tcp::connect(&addr, Bincode::default).await?;
            tracing::info!(address = %addr, "Subscribed to server notifications");
            // Responses are awaited one at a time: delivery order is the
            // server's send order.
            BaseChannel::with_defaults(transport)
                .execute(handler.serve())
                .for_each(|response| response)
                .await;
        }
        Endpoint::Unix(path) => {
            let stream = UnixStream::connect(&path).await?;
            let framed = LengthDelimitedCodec::builder().new_framed(stream);
            let transport = serde_transport::new(framed, Bincode::default());
            tracing::info!(path = %path.display(), "Subscribed to server notifications");
            BaseChannel::with_defaults(transport)
                .execute(handler.serve())
                .for_each(|response| response)
                .await;
        }
    }
    Ok(())
}

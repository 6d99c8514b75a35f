use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use greenpact_types::events::{ErrorFrame, RelayEvent};

use crate::dispatcher::Dispatcher;
use crate::session::{Session, SessionUser};

/// Heartbeat interval: server sends a Ping every 15 seconds. Missing pongs
/// never drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Authentication failed; the connection is closed.
    #[error("connection rejected")]
    Rejected,

    /// Reported back in-band; the connection stays open.
    #[error("{0}")]
    Failed(String),
}

impl From<anyhow::Error> for ChannelError {
    fn from(e: anyhow::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

pub type ChannelResult<F> = Result<Vec<F>, ChannelError>;

/// Behaviour of one kind of persistent connection. The shared loop feeds it
/// inbound payloads and relayed events and writes back whatever frames it
/// returns.
#[async_trait]
pub trait ChannelHandler: Send {
    type Frame: Serialize + Send;

    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn on_open(&mut self, _session: &mut Session) -> ChannelResult<Self::Frame> {
        Ok(Vec::new())
    }

    async fn on_message(&mut self, session: &mut Session, text: &str) -> ChannelResult<Self::Frame>;

    async fn on_event(&mut self, session: &mut Session, event: RelayEvent) -> ChannelResult<Self::Frame>;
}

enum Flow {
    Continue,
    Close,
}

/// Drives one WebSocket until the client leaves or authentication fails.
pub async fn run_channel<H: ChannelHandler>(
    socket: WebSocket,
    dispatcher: Dispatcher,
    user: Option<SessionUser>,
    mut handler: H,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut mailbox) = dispatcher.register().await;
    let mut session = Session::new(conn_id, dispatcher.clone(), user);
    let name = handler.name();

    info!("{} connection {} opened", name, conn_id);

    let opened = handler.on_open(&mut session).await;
    let mut flow = deliver(&mut sender, opened).await;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    while let Flow::Continue = flow {
        flow = tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str();
                    debug!("{} {} <- {}", name, conn_id, text.get(..200).unwrap_or(text));
                    let outcome = handler.on_message(&mut session, text).await;
                    deliver(&mut sender, outcome).await
                }
                Some(Ok(Message::Close(_))) | None => Flow::Close,
                Some(Err(e)) => {
                    debug!("{} {} read error: {}", name, conn_id, e);
                    Flow::Close
                }
                Some(Ok(_)) => Flow::Continue,
            },
            Some(event) = mailbox.recv() => {
                let outcome = handler.on_event(&mut session, event).await;
                deliver(&mut sender, outcome).await
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }
        };
    }

    dispatcher.unregister(conn_id).await;
    match session.user() {
        Some(user) => info!("{} ({}) left {} connection {}", user.username, user.id, name, conn_id),
        None => info!("{} connection {} closed unauthenticated", name, conn_id),
    }
}

async fn deliver<F: Serialize>(sender: &mut SplitSink<WebSocket, Message>, outcome: ChannelResult<F>) -> Flow {
    match outcome {
        Ok(frames) => {
            for frame in frames {
                if !send_json(sender, &frame).await {
                    return Flow::Close;
                }
            }
            Flow::Continue
        }
        Err(ChannelError::Rejected) => {
            warn!("rejecting unauthenticated connection");
            let _ = sender.send(Message::Close(None)).await;
            Flow::Close
        }
        Err(ChannelError::Failed(error)) => {
            if send_json(sender, &ErrorFrame { error }).await {
                Flow::Continue
            } else {
                Flow::Close
            }
        }
    }
}

/// Returns false once the socket is gone.
async fn send_json<T: Serialize>(sender: &mut SplitSink<WebSocket, Message>, value: &T) -> bool {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            warn!("dropping unserializable frame: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

/// Parses an inbound payload, reporting malformed JSON in-band.
pub fn parse_payload<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ChannelError> {
    serde_json::from_str(text).map_err(|e| ChannelError::Failed(format!("Invalid payload: {}", e)))
}

//! Per-connection WebSocket pump.
//!
//! Keeps framing and heartbeats at the edge: text frames go to the
//! [`EventDispatcher`] and events queued for the connection are written
//! back as JSON text frames. Malformed frames are answered by the
//! dispatcher and never close the socket. Any client frame counts as
//! activity for the [`Heartbeat`] idle timeout.

use std::time::Instant;

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use tracing::{debug, warn};

use crate::domain::presence::{ConnectionHandle, ConnectionId, EventDispatcher, ServerEvent};
use crate::domain::{TraceId, UserId};
use crate::inbound::ws::state::Heartbeat;

pub(super) async fn handle_ws_session(
    dispatcher: EventDispatcher,
    user_id: UserId,
    handle: ConnectionHandle,
    heartbeat: Heartbeat,
    session: Session,
    stream: MessageStream,
) {
    let ConnectionHandle { id, events } = handle;
    let pump = Pump {
        dispatcher,
        user_id,
        connection: id,
        heartbeat,
    };
    let ending = pump.run(session, stream, events).await;
    pump.dispatcher.disconnect(pump.connection, &pump.user_id).await;
    debug!(connection = %pump.connection, reason = ending.label(), "socket pump stopped");
}

/// Why a pump stopped.
enum Ending {
    ClientClosed(Option<CloseReason>),
    StreamEnded,
    Idle,
    Protocol(ProtocolError),
    QueueClosed,
    SendFailed(Closed),
}

impl Ending {
    fn label(&self) -> &'static str {
        match self {
            Self::ClientClosed(_) => "client closed",
            Self::StreamEnded => "stream ended",
            Self::Idle => "heartbeat timeout",
            Self::Protocol(_) => "protocol error",
            Self::QueueClosed => "event queue closed",
            Self::SendFailed(_) => "send failed",
        }
    }

    /// The close frame to send, or `None` when the socket is already gone.
    fn close_frame(&self) -> Option<Option<CloseReason>> {
        let reason = |code, text: &str| {
            Some(CloseReason {
                code,
                description: Some(text.to_owned()),
            })
        };
        match self {
            Self::Idle => Some(reason(CloseCode::Normal, "heartbeat timeout")),
            Self::Protocol(_) => Some(reason(CloseCode::Protocol, "protocol error")),
            Self::QueueClosed => Some(reason(CloseCode::Away, "server shutting down")),
            Self::ClientClosed(reason) => Some(reason.clone()),
            Self::StreamEnded | Self::SendFailed(_) => None,
        }
    }
}

struct Pump {
    dispatcher: EventDispatcher,
    user_id: UserId,
    connection: ConnectionId,
    heartbeat: Heartbeat,
}

impl Pump {
    async fn run(
        &self,
        mut session: Session,
        mut stream: MessageStream,
        mut events: UnboundedReceiver<ServerEvent>,
    ) -> Ending {
        let mut last_seen = Instant::now();
        let mut heartbeat = time::interval(self.heartbeat.interval);

        let ending = loop {
            let step = tokio::select! {
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > self.heartbeat.idle_timeout {
                        Err(Ending::Idle)
                    } else {
                        session.ping(b"").await.map_err(Ending::SendFailed)
                    }
                }
                frame = stream.recv() => match frame {
                    Some(Ok(frame)) => {
                        last_seen = Instant::now();
                        self.on_frame(&mut session, frame).await
                    }
                    Some(Err(error)) => Err(Ending::Protocol(error)),
                    None => Err(Ending::StreamEnded),
                },
                event = events.recv() => match event {
                    Some(event) => self.deliver(&mut session, &event).await,
                    None => Err(Ending::QueueClosed),
                },
            };
            if let Err(ending) = step {
                break ending;
            }
        };

        self.log_ending(&ending);
        if let Some(reason) = ending.close_frame() {
            if let Err(error) = session.close(reason).await {
                warn!(error = %error, "Failed to close WebSocket session");
            }
        }
        ending
    }

    async fn on_frame(&self, session: &mut Session, frame: Message) -> Result<(), Ending> {
        match frame {
            Message::Text(text) => {
                TraceId::scope(
                    TraceId::generate(),
                    self.dispatcher
                        .handle(self.connection, &self.user_id, text.as_ref()),
                )
                .await;
                Ok(())
            }
            Message::Ping(payload) => session.pong(&payload).await.map_err(Ending::SendFailed),
            Message::Binary(_) => {
                debug!(connection = %self.connection, "ignoring binary frame");
                Ok(())
            }
            Message::Pong(_) | Message::Continuation(_) | Message::Nop => Ok(()),
            Message::Close(reason) => Err(Ending::ClientClosed(reason)),
        }
    }

    async fn deliver(&self, session: &mut Session, event: &ServerEvent) -> Result<(), Ending> {
        let body = match serde_json::to_string(event) {
            Ok(body) => body,
            Err(error) => {
                warn!(connection = %self.connection, error = %error, "dropping unserialisable event");
                return Ok(());
            }
        };
        session.text(body).await.map_err(Ending::SendFailed)
    }

    fn log_ending(&self, ending: &Ending) {
        let connection = self.connection;
        match ending {
            Ending::Idle => warn!(%connection, "WebSocket heartbeat timeout; closing connection"),
            Ending::Protocol(error) => {
                warn!(%connection, error = %error, "WebSocket protocol error");
            }
            Ending::SendFailed(error) => {
                warn!(%connection, error = %error, "WebSocket send failed; closing connection");
            }
            Ending::QueueClosed => warn!(%connection, "event queue closed; closing connection"),
            Ending::ClientClosed(_) | Ending::StreamEnded => {}
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

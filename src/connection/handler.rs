// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::outbound::OutboundQueue;
use crate::core::BrokerError;
use crate::core::engine::{EngineEvent, EngineHandle};
use crate::core::protocol::{RequestCodec, Response};
use crate::core::session::SessionId;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// Shuttles frames between one client socket and the engine.
///
/// Requests are decoded incrementally and forwarded in arrival order. Replies and
/// events come back on the session's outbound channel and are written in the order the
/// engine produced them. When the engine drops that channel, queued frames are flushed
/// and the connection is closed.
pub struct ConnectionHandler<S> {
    stream: S,
    addr: String,
    engine: EngineHandle,
    session_id: SessionId,
    max_request_size: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: String,
        engine: EngineHandle,
        session_id: SessionId,
        max_request_size: usize,
    ) -> Self {
        Self {
            stream,
            addr,
            engine,
            session_id,
            max_request_size,
        }
    }

    /// The main event loop for the connection.
    pub async fn run(self) -> Result<(), BrokerError> {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Response>();
        if !self.engine.send(EngineEvent::Connect {
            id: self.session_id,
            addr: self.addr.clone(),
            outbound: outbound_tx,
        }) {
            debug!("Engine stopped; dropping connection from {}", self.addr);
            return Ok(());
        }
        let _guard = ConnectionGuard::new(self.engine.clone(), self.session_id, self.addr.clone());

        let (reader, mut writer) = tokio::io::split(self.stream);
        let mut frames = FramedRead::new(reader, RequestCodec::new(self.max_request_size));
        let mut outbound = OutboundQueue::new();

        loop {
            tokio::select! {
                biased;
                response = outbound_rx.recv() => match response {
                    Some(response) => {
                        outbound.push(response.to_bytes());
                        while let Ok(more) = outbound_rx.try_recv() {
                            outbound.push(more.to_bytes());
                        }
                        outbound.flush_to(&mut writer).await?;
                    }
                    None => {
                        debug!("Session {} closed by the engine.", self.session_id);
                        outbound.flush_to(&mut writer).await?;
                        let _ = writer.shutdown().await;
                        break;
                    }
                },
                frame = frames.next() => match frame {
                    Some(Ok(request)) => {
                        debug!("Session {}: received {}", self.session_id, request.command);
                        if !self.engine.send(EngineEvent::Request { id: self.session_id, request }) {
                            info!("Engine stopped; closing connection from {}", self.addr);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        if is_normal_disconnect(&e) {
                            debug!("Connection from {} closed by peer: {}", self.addr, e);
                        } else {
                            warn!("Closing connection from {}: {}", self.addr, e);
                        }
                        break;
                    }
                    None => {
                        debug!("Connection from {} closed by peer.", self.addr);
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &BrokerError) -> bool {
    matches!(e, BrokerError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}

//! Transport client: one socket to the engine plus a background receive task.
//!
//! The framing is chosen by URI scheme:
//!
//! - `ws://` / `wss://`: one JSON document per WebSocket text frame
//! - `tcp://host:port`: one JSON document per line
//!
//! The receive task decodes frames and pushes them into a bounded
//! [`inbox`](crate::inbox) in arrival order. A full inbox evicts its oldest
//! state, so a slow consumer never stalls the socket and the newest frame is
//! never lost; failures always get through.

use std::time::Duration;

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::inbox::{inbox, InboxReceiver, InboxSender};
use crate::protocol::{parse_message, ClientMessage, ParsedMessage};
use crate::types::RawGameState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One item from the receive queue.
#[derive(Debug)]
pub enum Inbound {
    State(RawGameState),
    Failed(AdapterError),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub uri: String,
    pub connect_timeout: Duration,
    pub queue_capacity: usize,
    pub max_protocol_errors: u32,
}

enum FrameWriter {
    WebSocket(SplitSink<WsStream, Message>),
    Lines(OwnedWriteHalf),
}

pub struct Transport {
    config: TransportConfig,
    writer: Option<FrameWriter>,
    inbound: Option<InboxReceiver>,
    reader: Option<JoinHandle<()>>,
    /// Connection failure seen while discarding; reported by the next `recv`.
    deferred: Option<AdapterError>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("uri", &self.config.uri)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            writer: None,
            inbound: None,
            reader: None,
            deferred: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.config.uri
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
            && self
                .reader
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false)
    }

    /// Open the socket and start the receive task. No-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect();

        let (tx, rx) = inbox(self.config.queue_capacity);
        let max_errors = self.config.max_protocol_errors.max(1);
        let timeout = self.config.connect_timeout;
        let uri = self.config.uri.clone();

        let (writer, reader) = if let Some(addr) = uri.strip_prefix("tcp://") {
            let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| AdapterError::Connection(format!("connect to {uri} timed out")))?
                .map_err(|e| AdapterError::Connection(format!("connect to {uri}: {e}")))?;
            let _ = stream.set_nodelay(true);
            let (read_half, write_half) = stream.into_split();
            let reader = tokio::spawn(read_lines(read_half, tx, max_errors));
            (FrameWriter::Lines(write_half), reader)
        } else {
            let (ws, _response) =
                tokio::time::timeout(timeout, tokio_tungstenite::connect_async(uri.as_str()))
                    .await
                    .map_err(|_| AdapterError::Connection(format!("connect to {uri} timed out")))?
                    .map_err(|e| AdapterError::Connection(format!("connect to {uri}: {e}")))?;
            let (sink, stream) = ws.split();
            let reader = tokio::spawn(read_frames(stream, tx, max_errors));
            (FrameWriter::WebSocket(sink), reader)
        };

        info!(uri = %uri, "connected to engine");
        self.writer = Some(writer);
        self.inbound = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = msg
            .to_json()
            .map_err(|e| AdapterError::Protocol(format!("encode {}: {e}", msg.name())))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| AdapterError::Connection("not connected".to_string()))?;
        debug!(request = msg.name(), "send");
        match writer {
            FrameWriter::WebSocket(sink) => sink
                .send(Message::Text(json))
                .await
                .map_err(|e| AdapterError::Connection(format!("send: {e}"))),
            FrameWriter::Lines(half) => {
                let mut line = json.into_bytes();
                line.push(b'\n');
                half.write_all(&line)
                    .await
                    .map_err(|e| AdapterError::Connection(format!("send: {e}")))?;
                half.flush()
                    .await
                    .map_err(|e| AdapterError::Connection(format!("send: {e}")))
            }
        }
    }

    /// Next queued item, waiting if none is queued.
    ///
    /// Returns `None` once the receive task has ended and the queue is drained.
    pub async fn recv(&mut self) -> Option<Inbound> {
        if let Some(err) = self.deferred.take() {
            return Some(Inbound::Failed(err));
        }
        self.inbound.as_mut()?.recv().await
    }

    /// Drop every queued state. Returns how many were dropped.
    ///
    /// Protocol failures in the backlog are dropped with them; a connection
    /// failure is kept and reported by the next [`recv`](Self::recv).
    pub fn discard_pending(&mut self) -> usize {
        let Some(rx) = self.inbound.as_mut() else {
            return 0;
        };
        let mut dropped = 0;
        while let Some(item) = rx.try_recv() {
            match item {
                Inbound::State(_) => dropped += 1,
                Inbound::Failed(AdapterError::Protocol(msg)) => {
                    debug!(error = %msg, "discarding stale protocol failure");
                }
                Inbound::Failed(err) => {
                    self.deferred.get_or_insert(err);
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "discarded stale states");
        }
        dropped
    }

    /// Stop the receive task and drop the socket without a close handshake.
    pub fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer = None;
        self.inbound = None;
        self.deferred = None;
    }

    /// Stop the receive task and close the socket. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inbound = None;
        self.deferred = None;
        match self.writer.take() {
            Some(FrameWriter::WebSocket(mut sink)) => {
                let _ = sink.close().await;
            }
            Some(FrameWriter::Lines(mut half)) => {
                let _ = half.shutdown().await;
            }
            None => {}
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Decode one frame and queue the result. Returns false once the consumer is gone.
fn dispatch(text: &str, tx: &InboxSender, bad: &mut u32, max_bad: u32) -> bool {
    match parse_message(text) {
        Ok(ParsedMessage::State(state)) => {
            *bad = 0;
            tx.push(Inbound::State(state))
        }
        Ok(ParsedMessage::Unknown(kind)) => {
            *bad = 0;
            debug!(kind = %kind, "ignoring message");
            true
        }
        Err(e) => {
            *bad += 1;
            warn!(error = %e, consecutive = *bad, "dropping undecodable frame");
            if *bad >= max_bad {
                *bad = 0;
                let err = AdapterError::Protocol(format!(
                    "{max_bad} consecutive undecodable frames, last: {e}"
                ));
                return tx.push(Inbound::Failed(err));
            }
            true
        }
    }
}

async fn read_frames(
    mut stream: futures_util::stream::SplitStream<WsStream>,
    tx: InboxSender,
    max_bad: u32,
) {
    let mut bad = 0u32;
    while let Some(frame) = stream.next().await {
        let keep_going = match frame {
            Ok(Message::Text(text)) => dispatch(&text, &tx, &mut bad, max_bad),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch(text, &tx, &mut bad, max_bad),
                Err(_) => dispatch("", &tx, &mut bad, max_bad),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => true,
            Err(e) => {
                connection_lost(&tx, format!("receive: {e}"));
                return;
            }
        };
        if !keep_going {
            return;
        }
    }
    connection_lost(&tx, "engine closed the connection".to_string());
}

async fn read_lines<R>(read: R, tx: InboxSender, max_bad: u32)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(read).lines();
    let mut bad = 0u32;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !dispatch(line, &tx, &mut bad, max_bad) {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                connection_lost(&tx, format!("receive: {e}"));
                return;
            }
        }
    }
    connection_lost(&tx, "engine closed the connection".to_string());
}

fn connection_lost(tx: &InboxSender, reason: String) {
    tx.push(Inbound::Failed(AdapterError::Connection(reason)));
}

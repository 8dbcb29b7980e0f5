//! Protocol state machine over one [`Transport`].
//!
//! ```text
//! Disconnected -> Connecting -> [AwaitingOwnership] -> Ready <-> Terminated
//!        ^                                              |
//!        +---------------- connection lost -------------+
//! any state -> Closed
//! ```
//!
//! Exactly one request is in flight at a time. Every wait for a reply races
//! the reply timeout and the close signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::protocol::ClientMessage;
use crate::transport::{Inbound, Transport, TransportConfig};
use crate::types::RawGameState;

/// Cloneable, thread-safe trigger that closes an environment.
///
/// Closing wakes any call that is waiting on the engine, which then returns
/// [`AdapterError::Closed`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CloseHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingOwnership,
    Ready,
    Terminated,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub ownership_handshake: bool,
    pub reply_timeout: Duration,
}

#[derive(Debug)]
pub struct Session {
    transport: Transport,
    state: SessionState,
    ownership_handshake: bool,
    owner_sent: bool,
    reply_timeout: Duration,
    in_flight: bool,
    poisoned: Option<String>,
    closed: watch::Receiver<bool>,
}

impl Session {
    pub fn new(config: SessionConfig, close: &CloseHandle) -> Self {
        Self {
            transport: Transport::new(config.transport),
            state: SessionState::Disconnected,
            ownership_handshake: config.ownership_handshake,
            owner_sent: false,
            reply_timeout: config.reply_timeout,
            in_flight: false,
            poisoned: None,
            closed: close.subscribe(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Connect if not already connected.
    pub async fn connect(&mut self) -> Result<()> {
        self.check_usable()?;
        self.ensure_connected().await
    }

    /// Start a new episode and return the engine's first state.
    ///
    /// `viewport` is sent with the restart request when given.
    pub async fn reset(&mut self, viewport: Option<(u32, u32)>) -> Result<RawGameState> {
        self.check_usable()?;
        self.ensure_connected().await?;
        if self.ownership_handshake && !self.owner_sent {
            self.become_owner().await?;
        }
        let state = self.exchange(ClientMessage::restart(viewport)).await?;
        self.state = if state.game_over {
            SessionState::Terminated
        } else {
            SessionState::Ready
        };
        Ok(state)
    }

    /// Advance one frame with the given action label.
    pub async fn step(&mut self, action: &str) -> Result<RawGameState> {
        self.check_usable()?;
        match self.state {
            SessionState::Ready => {}
            SessionState::Terminated => return Err(AdapterError::EpisodeTerminated),
            SessionState::Closed => return Err(AdapterError::Closed),
            SessionState::Disconnected
            | SessionState::Connecting
            | SessionState::AwaitingOwnership => return Err(AdapterError::NotReset),
        }
        let state = self.exchange(ClientMessage::step(action)).await?;
        if state.game_over {
            self.state = SessionState::Terminated;
        }
        Ok(state)
    }

    /// Ask to join the engine's shared owners. The engine sends no reply.
    pub async fn become_owner(&mut self) -> Result<()> {
        self.check_usable()?;
        self.ensure_connected().await?;
        self.state = SessionState::AwaitingOwnership;
        if let Err(e) = self.transport.send(&ClientMessage::BecomeSharedOwner).await {
            return Err(self.fail(e));
        }
        self.owner_sent = true;
        debug!("sent become_shared_owner");
        Ok(())
    }

    /// Close the transport. Later calls fail with `Closed`.
    pub async fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!(uri = self.transport.uri(), "closing session");
        }
        self.state = SessionState::Closed;
        self.transport.close().await;
    }

    fn check_usable(&self) -> Result<()> {
        if self.state == SessionState::Closed || *self.closed.borrow() {
            return Err(AdapterError::Closed);
        }
        if let Some(reason) = &self.poisoned {
            return Err(AdapterError::Poisoned(reason.clone()));
        }
        if self.in_flight {
            return Err(AdapterError::RequestInFlight);
        }
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.state = SessionState::Connecting;
        self.owner_sent = false;
        let outcome = tokio::select! {
            biased;
            _ = self.closed.wait_for(|closed| *closed) => Err(AdapterError::Closed),
            r = self.transport.connect() => r,
        };
        if let Err(e) = outcome {
            self.transport.disconnect();
            self.state = SessionState::Disconnected;
            return Err(e);
        }
        Ok(())
    }

    /// Send one request and wait for the state that answers it.
    async fn exchange(&mut self, msg: ClientMessage) -> Result<RawGameState> {
        if self.in_flight {
            return Err(AdapterError::RequestInFlight);
        }
        self.in_flight = true;
        self.transport.discard_pending();

        if let Err(e) = self.transport.send(&msg).await {
            self.in_flight = false;
            return Err(self.fail(e));
        }

        let timeout = self.reply_timeout;
        let outcome = tokio::select! {
            biased;
            _ = self.closed.wait_for(|closed| *closed) => Err(AdapterError::Closed),
            r = tokio::time::timeout(timeout, self.transport.recv()) => match r {
                Err(_) => Err(AdapterError::Timeout(timeout)),
                Ok(Some(Inbound::State(state))) => Ok(state),
                Ok(Some(Inbound::Failed(e))) => Err(e),
                Ok(None) => Err(AdapterError::Connection("receive loop ended".to_string())),
            },
        };
        self.in_flight = false;

        match outcome {
            Ok(state) => {
                debug!(
                    request = msg.name(),
                    blocks = state.blocks.len(),
                    game_over = state.game_over,
                    "reply"
                );
                Ok(state)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Apply the state transition a failure implies and hand the error back.
    fn fail(&mut self, err: AdapterError) -> AdapterError {
        match &err {
            AdapterError::Connection(msg) => {
                warn!(error = %msg, "connection lost");
                self.transport.disconnect();
                self.state = SessionState::Disconnected;
                self.owner_sent = false;
            }
            AdapterError::Timeout(_) | AdapterError::Protocol(_) => {
                warn!(error = %err, "session poisoned");
                self.poisoned = Some(err.to_string());
            }
            AdapterError::Closed => {
                self.state = SessionState::Closed;
            }
            _ => {}
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    const READY: &str = r#"{"type":"state","state":{"playerX":370,"blocks":[],"gameOver":false}}"#;
    const OVER: &str = r#"{"type":"state","state":{"playerX":370,"blocks":[],"gameOver":true}}"#;

    fn session(addr: std::net::SocketAddr, reply_timeout: Duration, close: &CloseHandle) -> Session {
        Session::new(
            SessionConfig {
                transport: TransportConfig {
                    uri: format!("tcp://{addr}"),
                    connect_timeout: Duration::from_secs(2),
                    queue_capacity: 8,
                    max_protocol_errors: 4,
                },
                ownership_handshake: false,
                reply_timeout,
            },
            close,
        )
    }

    /// Engine that answers each request line with the next scripted reply.
    /// `None` means "read the request but stay silent".
    async fn scripted(replies: Vec<Option<&'static str>>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            for reply in replies {
                if lines.next_line().await.ok().flatten().is_none() {
                    return;
                }
                if let Some(reply) = reply {
                    write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
                }
            }
            let _ = lines.next_line().await;
        });
        addr
    }

    #[tokio::test]
    async fn step_before_reset_is_rejected() {
        let close = CloseHandle::new();
        let addr = scripted(vec![]).await;
        let mut s = session(addr, Duration::from_secs(1), &close);
        assert!(matches!(s.step("LEFT").await, Err(AdapterError::NotReset)));
    }

    #[tokio::test]
    async fn terminal_reply_blocks_further_steps() {
        let close = CloseHandle::new();
        let addr = scripted(vec![Some(READY), Some(OVER)]).await;
        let mut s = session(addr, Duration::from_secs(2), &close);
        assert_ok!(s.reset(None).await);
        assert_eq!(s.state(), SessionState::Ready);
        let state = assert_ok!(s.step("LEFT").await);
        assert!(state.game_over);
        assert_eq!(s.state(), SessionState::Terminated);
        assert!(matches!(
            s.step("LEFT").await,
            Err(AdapterError::EpisodeTerminated)
        ));
    }

    #[tokio::test]
    async fn timeout_poisons_the_session() {
        let close = CloseHandle::new();
        let addr = scripted(vec![None]).await;
        let mut s = session(addr, Duration::from_millis(100), &close);
        assert!(matches!(s.reset(None).await, Err(AdapterError::Timeout(_))));
        assert!(s.is_poisoned());
        assert!(matches!(s.reset(None).await, Err(AdapterError::Poisoned(_))));
    }

    #[tokio::test]
    async fn close_signal_releases_a_waiting_request() {
        let close = CloseHandle::new();
        let addr = scripted(vec![None]).await;
        let mut s = session(addr, Duration::from_secs(30), &close);

        let trigger = close.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.close();
        });

        let started = std::time::Instant::now();
        assert!(matches!(s.reset(None).await, Err(AdapterError::Closed)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(s.state(), SessionState::Closed);
        assert_err!(s.reset(None).await);
    }

    #[tokio::test]
    async fn lost_connection_allows_reconnect_on_reset() {
        let close = CloseHandle::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // First connection: drop right after the restart request.
            let (stream, _) = listener.accept().await.unwrap();
            let (read, _write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
            drop(lines);
            drop(_write);

            // Second connection: behave.
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
            write.write_all(format!("{READY}\n").as_bytes()).await.unwrap();
            let _ = lines.next_line().await;
        });

        let mut s = session(addr, Duration::from_secs(2), &close);
        let err = s.reset(None).await.unwrap_err();
        assert!(err.is_connection_loss());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_ok!(s.reset(None).await);
        assert_eq!(s.state(), SessionState::Ready);
    }
}

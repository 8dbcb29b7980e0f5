#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use dodger_gym::adapter::protocol::{ClientMessage, ServerMessage};
use dodger_gym::types::{Block, RawGameState};

/// Per-connection counters passed to the engine script.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conn {
    pub index: usize,
    pub restarts: u32,
    pub steps_since_restart: u32,
}

/// Script: given a request and the connection's counters, the frames to send back.
/// An empty vector means "stay silent".
pub type Script = dyn Fn(&ClientMessage, &Conn) -> Vec<String> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    WebSocket,
    Lines,
}

/// Handle to a scripted engine running on its own thread.
pub struct Engine {
    pub uri: String,
    received: Arc<Mutex<Vec<(usize, ClientMessage)>>>,
}

impl Engine {
    /// Every request seen so far, with the connection it arrived on.
    pub fn received(&self) -> Vec<(usize, ClientMessage)> {
        self.received.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<ClientMessage> {
        self.received().into_iter().map(|(_, m)| m).collect()
    }
}

pub fn state(player_x: f64, blocks: &[(f64, f64)], game_over: bool) -> RawGameState {
    RawGameState::new(
        player_x,
        blocks.iter().map(|&(x, y)| Block::new(x, y)).collect(),
        game_over,
    )
}

pub fn state_json(s: &RawGameState) -> String {
    ServerMessage::state(s).to_json().unwrap()
}

pub fn reply(s: &RawGameState) -> Vec<String> {
    vec![state_json(s)]
}

pub fn spawn_engine<F>(framing: Framing, script: F) -> Engine
where
    F: Fn(&ClientMessage, &Conn) -> Vec<String> + Send + Sync + 'static,
{
    let script: Arc<Script> = Arc::new(script);
    let received = Arc::new(Mutex::new(Vec::new()));
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    let log = received.clone();
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            let mut index = 0;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let conn = Conn {
                    index,
                    ..Conn::default()
                };
                index += 1;
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    match framing {
                        Framing::WebSocket => serve_ws(stream, conn, script, log).await,
                        Framing::Lines => serve_lines(stream, conn, script, log).await,
                    }
                });
            }
        });
    });

    let addr = addr_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let uri = match framing {
        Framing::WebSocket => format!("ws://{addr}"),
        Framing::Lines => format!("tcp://{addr}"),
    };
    Engine { uri, received }
}

fn record(
    text: &str,
    conn: &mut Conn,
    log: &Mutex<Vec<(usize, ClientMessage)>>,
) -> Option<ClientMessage> {
    let msg: ClientMessage = serde_json::from_str(text).ok()?;
    match msg {
        ClientMessage::Restart { .. } => {
            conn.restarts += 1;
            conn.steps_since_restart = 0;
        }
        ClientMessage::Step { .. } => conn.steps_since_restart += 1,
        ClientMessage::BecomeSharedOwner => {}
    }
    log.lock().unwrap().push((conn.index, msg.clone()));
    Some(msg)
}

async fn serve_ws(
    stream: TcpStream,
    mut conn: Conn,
    script: Arc<Script>,
    log: Arc<Mutex<Vec<(usize, ClientMessage)>>>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    while let Some(Ok(frame)) = ws.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Some(msg) = record(&text, &mut conn, &log) else {
            continue;
        };
        for out in script(&msg, &conn) {
            if ws.send(Message::Text(out)).await.is_err() {
                return;
            }
        }
    }
}

async fn serve_lines(
    stream: TcpStream,
    mut conn: Conn,
    script: Arc<Script>,
    log: Arc<Mutex<Vec<(usize, ClientMessage)>>>,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(msg) = record(&line, &mut conn, &log) else {
            continue;
        };
        for out in script(&msg, &conn) {
            let framed = format!("{out}\n");
            if write.write_all(framed.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

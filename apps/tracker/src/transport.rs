//! Streaming transport seam.
//!
//! The subscription manager only sees a `Link`: an outbound queue, an inbound
//! text stream and a `watch` of the connection's ready state. `WsTransport`
//! backs it with a websocket driven by its own task.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadyState::Closing | ReadyState::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping(Vec<u8>),
}

/// One connection attempt. Dropping the link closes the connection.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<String>,
    pub state: watch::Receiver<ReadyState>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes the connection. Resolves once the transport handshake
    /// is done (or has failed); the link may still report `Connecting`
    /// until it is usable, and reports `Closed` once the connection is gone.
    async fn open(&self, url: &str) -> Result<Link>;
}

/// Websocket transport. The TCP and TLS handshake is bounded by
/// `connect_timeout`, separately from the readiness wait that follows.
#[derive(Debug, Clone, Copy)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Link> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| anyhow!("connecting to {url} timed out after {:?}", self.connect_timeout))?
            .with_context(|| format!("failed connecting to {url}"))?;
        info!("Connected to RPC");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ReadyState::Open);

        tokio::spawn(async move {
            if let Err(e) = drive(ws, out_rx, in_tx, &state_tx).await {
                warn!("WebSocket error: {e:?}");
            }
            state_tx.send_replace(ReadyState::Closed);
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
            state: state_rx,
        })
    }
}

async fn drive(
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    in_tx: mpsc::UnboundedSender<String>,
    state_tx: &watch::Sender<ReadyState>,
) -> Result<()> {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(Outbound::Text(text)) => {
                    write.send(Message::Text(text)).await.context("ws send")?;
                }
                Some(Outbound::Ping(payload)) => {
                    write.send(Message::Ping(payload)).await.context("ws ping")?;
                }
                None => {
                    // owner dropped the link
                    state_tx.send_replace(ReadyState::Closing);
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(text).is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if in_tx.send(String::from_utf8_lossy(&bytes).into_owned()).is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await.context("ws pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Disconnected from RPC: {frame:?}");
                    state_tx.send_replace(ReadyState::Closing);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(anyhow!("ws read error: {e}")),
                None => {
                    debug!("ws stream ended");
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ReadyState::Connecting.is_terminal());
        assert!(!ReadyState::Open.is_terminal());
        assert!(ReadyState::Closing.is_terminal());
        assert!(ReadyState::Closed.is_terminal());
    }

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_open() {
        let transport = WsTransport::new(Duration::from_secs(5));
        assert!(transport.open("ws://127.0.0.1:9").await.is_err());
    }

    #[tokio::test]
    async fn test_stalled_handshake_is_bounded() {
        // accepts TCP but never answers the upgrade request
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let transport = WsTransport::new(Duration::from_millis(300));
        let err = transport.open(&format!("ws://{addr}")).await.err().unwrap();
        assert!(err.to_string().contains("timed out"));
        server.abort();
    }

    #[tokio::test]
    async fn test_open_link_relays_text_and_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            // echo one frame, then hang up
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(format!("echo:{text}"))).await.unwrap();
            }
            ws.close(None).await.unwrap();
        });

        let transport = WsTransport::new(Duration::from_secs(5));
        let mut link = transport.open(&format!("ws://{addr}")).await.unwrap();
        assert_eq!(*link.state.borrow(), ReadyState::Open);

        link.outbound.send(Outbound::Text("hello".to_string())).unwrap();
        assert_eq!(link.inbound.recv().await.as_deref(), Some("echo:hello"));

        let state = link
            .state
            .wait_for(|s| *s == ReadyState::Closed)
            .await
            .map(|s| *s)
            .unwrap();
        assert_eq!(state, ReadyState::Closed);
    }
}

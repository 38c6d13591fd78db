//! WebSocket listener and transport using tokio-tungstenite.
//!
//! The listener accepts TCP connections, performs the WebSocket upgrade while
//! capturing the request URI (the browser supplies the connection id in the
//! path and the bearer token as a query parameter), and hands accepted
//! connections to the server over a channel.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use seashell_core::{BridgeError, BridgeResult, FrameTransport};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum inbound frame size (1 MiB).
const MAX_FRAME_SIZE: usize = 1_048_576;

/// How long `close` waits for the WebSocket close handshake to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
    /// Request URI captured during the upgrade handshake.
    pub uri: Uri,
}

/// Start the WebSocket listener.
///
/// Returns a receiver that yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> BridgeResult<mpsc::Receiver<WebSocketConnection>> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| BridgeError::Transport(format!("WS bind failed: {e}")))?;

    info!(addr = %bind_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut request_uri = None;
                        let upgrade = tokio_tungstenite::accept_hdr_async(
                            stream,
                            |req: &Request, resp: Response| {
                                request_uri = Some(req.uri().clone());
                                Ok(resp)
                            },
                        )
                        .await;

                        match (upgrade, request_uri) {
                            (Ok(ws_stream), Some(uri)) => {
                                debug!(remote = %addr, path = %uri.path(), "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                    uri,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            (Err(e), _) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                            (Ok(_), None) => {
                                warn!(remote = %addr, "WebSocket handshake yielded no request URI");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok(rx)
}

/// [`FrameTransport`] over one accepted WebSocket.
///
/// The sink and stream halves carry their own locks: the output and
/// diagnostic pumps share the sink, the input pump owns the stream in
/// practice. Teardown may close the transport concurrently with in-flight
/// I/O on either half; the cancellation token aborts those operations so a
/// stalled or uncooperative peer cannot pin a pump or the coordinator.
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    cancel: CancellationToken,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(ws_stream: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&self, frame: Vec<u8>) -> BridgeResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(BridgeError::Transport("transport closed".to_string()))
            }
            result = async { self.sink.lock().await.send(Message::Binary(frame)).await } => {
                result.map_err(|e| BridgeError::Transport(format!("WS send failed: {e}")))
            }
        }
    }

    async fn recv(&self) -> BridgeResult<Option<Vec<u8>>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(None),
            result = async {
                let mut stream = self.stream.lock().await;
                loop {
                    match stream.next().await {
                        // Browsers send the JSON control protocol as text
                        // frames and raw input as binary; both are inbound
                        // frames to the codec.
                        Some(Ok(Message::Binary(data))) => {
                            if data.len() > MAX_FRAME_SIZE {
                                return Err(BridgeError::Transport(format!(
                                    "WS frame too large: {} bytes (max {MAX_FRAME_SIZE})",
                                    data.len()
                                )));
                            }
                            return Ok(Some(data.to_vec()));
                        }
                        Some(Ok(Message::Text(text))) => {
                            if text.len() > MAX_FRAME_SIZE {
                                return Err(BridgeError::Transport(format!(
                                    "WS frame too large: {} bytes (max {MAX_FRAME_SIZE})",
                                    text.len()
                                )));
                            }
                            return Ok(Some(text.into_bytes()));
                        }
                        Some(Ok(Message::Close(_))) => return Ok(None),
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = self.sink.lock().await.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            return Err(BridgeError::Transport(format!("WS recv failed: {e}")));
                        }
                        None => return Ok(None),
                    }
                }
            } => result,
        }
    }

    async fn send_text(&self, message: &str) -> BridgeResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(BridgeError::Transport("transport closed".to_string()))
            }
            result = async {
                self.sink.lock().await.send(Message::Text(message.to_string())).await
            } => {
                result.map_err(|e| BridgeError::Transport(format!("WS send failed: {e}")))
            }
        }
    }

    async fn close(&self) {
        // Abort in-flight sends and recvs first so the sink lock frees and
        // no pump stays parked on a peer that stopped reading.
        self.cancel.cancel();
        let _ = tokio::time::timeout(CLOSE_GRACE, async {
            // Double-close just errors inside tungstenite; ignore it.
            let _ = self.sink.lock().await.close().await;
        })
        .await;
    }
}

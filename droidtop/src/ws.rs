//! WebSocket shell-bridge client: one command out, one raw text reply back.

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Total loss of the device link. Field-level problems (a command that ran
/// but produced garbage) are not transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid bridge url: {0}")]
    BadUrl(String),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("bridge connection closed")]
    Closed,
}

pub fn validate_url(s: &str) -> Result<Url, TransportError> {
    let url = Url::parse(s).map_err(|e| TransportError::BadUrl(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::BadUrl(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

// Connect to the device's shell bridge and return the WS stream
pub async fn connect(url: &str) -> Result<WsStream, TransportError> {
    let url = validate_url(url)?;
    let (ws, _) = connect_async(url.as_str()).await?;
    Ok(ws)
}

/// Send one shell command and await its text reply. Control frames are
/// skipped; a closed stream is a transport failure.
pub async fn run_command(ws: &mut WsStream, cmd: &str) -> Result<String, TransportError> {
    ws.send(Message::Text(cmd.into())).await?;
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(out))) => return Ok(out.trim().to_string()),
            Some(Ok(Message::Binary(out))) => {
                return Ok(String::from_utf8_lossy(&out).trim().to_string())
            }
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

// Re-export SinkExt/StreamExt for call sites
use futures_util::{SinkExt, StreamExt};

//! Socket dial and handshake. The handshake is opaque to the rest of
//! the system: it either yields a ready session stream or a
//! `DeckError::Connect`.

use crate::error::{DeckError, Result};
use crate::obs::protocol::{ClientMessage, ServerMessage};
use crate::obs::ConnectionParams;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One full handshake round-trip must finish within this window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Dial the control server and complete the credential exchange.
///
/// # Errors
/// Returns `DeckError::Connect` on any dial, timeout, or handshake
/// failure, including a rejected credential.
pub(crate) async fn connect(params: &ConnectionParams) -> Result<WsStream> {
    let (stream, _) = tokio_tungstenite::connect_async(params.address.as_str())
        .await
        .map_err(|e| DeckError::Connect(e.to_string()))?;

    tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(stream, &params.credential))
        .await
        .map_err(|_| DeckError::Connect("handshake timed out".into()))?
}

async fn handshake(mut stream: WsStream, credential: &str) -> Result<WsStream> {
    let hello = read_message(&mut stream).await?;
    let ServerMessage::Hello { auth_required } = hello else {
        return Err(DeckError::Connect(
            "server did not open with hello".into(),
        ));
    };
    debug!("server hello, auth required: {auth_required}");

    let identify = ClientMessage::Identify {
        credential: credential.to_string(),
    };
    let text = serde_json::to_string(&identify)?;
    stream
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| DeckError::Connect(e.to_string()))?;

    match read_message(&mut stream).await? {
        ServerMessage::Identified => Ok(stream),
        other => Err(DeckError::Connect(format!(
            "handshake rejected: {other:?}"
        ))),
    }
}

/// Read the next JSON text frame, skipping transport control frames.
async fn read_message(stream: &mut WsStream) -> Result<ServerMessage> {
    while let Some(frame) = stream.next().await {
        match frame.map_err(|e| DeckError::Connect(e.to_string()))? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(DeckError::Connect(
        "connection closed during handshake".into(),
    ))
}

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use obsdeck::obs::protocol::{ClientMessage, Request, Scene, SceneList, ServerMessage};
use obsdeck::obs::ConnectionStatus;
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

type Ws = tokio_tungstenite::WebSocketStream<TcpStream>;

/// In-process control server speaking the wire protocol.
pub struct MockServer {
    pub addr: String,
    /// Every request any session received, in order.
    pub requests: mpsc::UnboundedReceiver<Request>,
    kill_tx: broadcast::Sender<()>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start(scenes: &[&str], password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("ws://{}", listener.local_addr().unwrap());
        let scenes: Vec<String> = scenes.iter().map(|s| (*s).to_string()).collect();
        let password = password.to_string();
        let (req_tx, requests) = mpsc::unbounded_channel();
        let (kill_tx, _) = broadcast::channel(4);

        let accept_kill = kill_tx.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_connection(
                    stream,
                    scenes.clone(),
                    password.clone(),
                    req_tx.clone(),
                    accept_kill.subscribe(),
                ));
            }
        });

        Self {
            addr,
            requests,
            kill_tx,
            accept_task,
        }
    }

    /// Close every live session; the client sees an unexpected close.
    /// New connections are still accepted.
    pub fn kill_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Stop accepting and close every live session.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let _ = self.kill_tx.send(());
    }
}

async fn serve_connection(
    stream: TcpStream,
    scenes: Vec<String>,
    password: String,
    req_tx: mpsc::UnboundedSender<Request>,
    mut kill_rx: broadcast::Receiver<()>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    if send(&mut ws, &ServerMessage::Hello {
        auth_required: true,
    })
    .await
    .is_err()
    {
        return;
    }

    let Some(ClientMessage::Identify { credential }) = recv(&mut ws).await else {
        return;
    };
    if credential != password {
        let _ = ws.close(None).await;
        return;
    }
    if send(&mut ws, &ServerMessage::Identified).await.is_err() {
        return;
    }

    loop {
        let message = tokio::select! {
            _ = kill_rx.recv() => None,
            message = recv(&mut ws) => message,
        };
        let Some(ClientMessage::Request {
            request_id,
            request,
        }) = message
        else {
            let _ = ws.close(None).await;
            return;
        };

        let _ = req_tx.send(request.clone());
        let data = match &request {
            Request::ListScenes => serde_json::to_value(SceneList {
                scenes: scenes
                    .iter()
                    .map(|name| Scene {
                        scene_name: name.clone(),
                    })
                    .collect(),
            })
            .unwrap(),
            Request::SetCurrentScene { .. } => Value::Null,
        };
        let reply = ServerMessage::Response {
            request_id,
            data,
            error: None,
        };
        if send(&mut ws, &reply).await.is_err() {
            return;
        }
    }
}

async fn recv(ws: &mut Ws) -> Option<ClientMessage> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}

async fn send(ws: &mut Ws, message: &ServerMessage) -> Result<(), ()> {
    let text = serde_json::to_string(message).unwrap();
    ws.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// An address nothing listens on: bind, note the port, drop.
pub async fn refused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    addr
}

/// A server that accepts TCP but never answers the websocket
/// handshake: connect attempts against it stay in flight.
pub struct HangServer {
    pub addr: String,
    task: tokio::task::JoinHandle<()>,
}

pub async fn start_hang_server() -> HangServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            held.push(stream);
        }
    });
    HangServer { addr, task }
}

/// Next status transition, with a deadline.
pub async fn next_status(
    rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>,
) -> ConnectionStatus {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a status transition")
        .expect("status channel closed")
}

/// Drain transitions until `want` is observed.
pub async fn wait_for(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>, want: ConnectionStatus) {
    loop {
        if next_status(rx).await == want {
            return;
        }
    }
}

//! Wire format of the control-server protocol: JSON text frames over a
//! persistent websocket. Field names are camelCase to match the
//! persisted-config convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by the control server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First message after the socket opens.
    #[serde(rename_all = "camelCase")]
    Hello {
        #[serde(default)]
        auth_required: bool,
    },

    /// Handshake accepted; the session is ready for requests.
    Identified,

    /// Reply to a single request, matched by `requestId`.
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: String,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Messages sent by this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Single-shot credential exchange, answered with `identified`.
    #[serde(rename_all = "camelCase")]
    Identify { credential: String },

    /// An operation request; the server answers with a `response`
    /// carrying the same `requestId`.
    #[serde(rename_all = "camelCase")]
    Request {
        request_id: String,
        #[serde(flatten)]
        request: Request,
    },
}

/// The two operations the deck depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    ListScenes,
    #[serde(rename_all = "camelCase")]
    SetCurrentScene { scene_name: String },
}

impl Request {
    /// Method name for logs and error messages.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Request::ListScenes => "ListScenes",
            Request::SetCurrentScene { .. } => "SetCurrentScene",
        }
    }
}

/// Payload of a successful `ListScenes` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneList {
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub scene_name: String,
}

impl SceneList {
    /// Scene names in server order.
    #[must_use]
    pub fn into_names(self) -> Vec<String> {
        self.scenes.into_iter().map(|s| s.scene_name).collect()
    }
}

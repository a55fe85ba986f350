use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, Role};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready {
        user_id: Uuid,
        username: String,
        role: Role,
    },

    /// A notification addressed to this client (or system-wide) was created
    NewNotification { notification: Notification },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Client announces which recipient it wants to receive events for.
    /// The server treats this as untrusted input: the id must match the
    /// identity authenticated at upgrade time, otherwise it is ignored.
    Join { user_id: Uuid },
}

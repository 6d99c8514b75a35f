use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ContractView;

/// Named broadcast address. Publishing to a group reaches every connection
/// that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    /// Everyone currently joined to a chat room.
    Room(String),
    /// Every notification connection of one user.
    Notifications(String),
    /// Every contract connection of one user.
    Contracts(String),
}

impl Group {
    pub fn key(&self) -> String {
        match self {
            Self::Room(name) => format!("chat_{}", name),
            Self::Notifications(username) => format!("notifications_{}", username),
            Self::Contracts(username) => format!("contract_{}", username),
        }
    }
}

/// Events fanned out through the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayEvent {
    /// A chat message was persisted in a room
    NewChatMessage {
        room: String,
        #[serde(flatten)]
        line: ChatLine,
    },

    /// Fresh unread counters for the receiving user
    UnreadSummary(UnreadSummary),

    /// The receiving user's total contract count changed
    ContractCountUpdate { count: i64 },
}

/// One chat message as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadSummary {
    pub total_unread: i64,
    #[serde(rename = "lastmessages")]
    pub rooms: Vec<RoomUnread>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUnread {
    pub room: String,
    pub message: String,
    pub unread: i64,
}

// -- Chat channel --

/// Payload sent FROM client TO server on a chat connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCommand {
    /// Only read while the connection is still unauthenticated.
    pub token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatFrame {
    /// Pushed once, right after joining
    History { messages: Vec<ChatLine> },
    Message(ChatLine),
}

// -- Notification channel --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    MarkAsRead,
}

/// Payload sent FROM client TO server on a notification connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationCommand {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub action: Option<NotificationAction>,
    pub room_name: Option<String>,
}

// -- Contract channel --

/// Payload sent FROM client TO server on a contract connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractCommand {
    pub token: Option<String>,
    pub action: Option<String>,
    pub contract_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ContractFrame {
    Contracts { data: Vec<ContractView> },
    CountChanged { count: i64, data: Vec<ContractView> },
    Approved { success: bool },
}

/// In-band error written back on any channel.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    pub error: String,
}

//! Chat fan-out, unread aggregation and contract-count broadcast. Both the
//! WebSocket channels and the REST handlers go through here so every path
//! produces the same rows and events.

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, warn};
use uuid::Uuid;

use greenpact_db::Database;
use greenpact_db::models::MessageRow;
use greenpact_types::events::{ChatLine, Group, RelayEvent, UnreadSummary};

use crate::dispatcher::Dispatcher;
use crate::session::SessionUser;
use crate::store::blocking;

/// Messages pushed to a connection when it joins a room.
pub const HISTORY_LIMIT: u32 = 50;

pub fn chat_line(row: MessageRow) -> ChatLine {
    ChatLine {
        username: row.sender_username,
        message: row.content,
        timestamp: row.created_at,
    }
}

pub const EMPTY_MESSAGE: &str = "Message cannot be empty";

/// The text a chat message is stored with, or `None` when nothing is left
/// after trimming.
pub fn chat_text(content: &str) -> Option<&str> {
    Some(content.trim()).filter(|text| !text.is_empty())
}

/// Persists a message from `sender`, notifies every other participant and
/// publishes the line to the room.
pub async fn deliver_chat_message(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    room: &str,
    sender: &SessionUser,
    content: &str,
) -> Result<ChatLine> {
    let Some(text) = chat_text(content) else {
        bail!(EMPTY_MESSAGE);
    };
    let (room_name, sender_id, text) = (room.to_string(), sender.id, text.to_string());
    let posted = blocking(db, move |db| db.post_message(&room_name, sender_id, &text)).await?;

    for recipient in posted.recipients {
        let recipient_id = recipient.id;
        let summary = blocking(db, move |db| db.unread_summary(recipient_id)).await?;
        let group = Group::Notifications(recipient.username);
        let reached = dispatcher.publish(&group, RelayEvent::UnreadSummary(summary)).await;
        debug!("unread summary for {} reached {} connections", group.key(), reached);
    }

    let line = chat_line(posted.message);
    dispatcher
        .publish(
            &Group::Room(room.to_string()),
            RelayEvent::NewChatMessage { room: room.to_string(), line: line.clone() },
        )
        .await;
    Ok(line)
}

/// The last messages of a room, oldest first.
pub async fn chat_history(db: &Arc<Database>, room: &str) -> Result<Vec<ChatLine>> {
    let room = room.to_string();
    let rows = blocking(db, move |db| db.recent_messages(&room, HISTORY_LIMIT)).await?;
    Ok(rows.into_iter().map(chat_line).collect())
}

pub async fn unread_summary(db: &Arc<Database>, user_id: Uuid) -> Result<UnreadSummary> {
    blocking(db, move |db| db.unread_summary(user_id)).await
}

/// Pushes each named user's current contract total to their contract group.
/// Best effort: failures are logged and skipped.
pub async fn publish_contract_counts(db: &Arc<Database>, dispatcher: &Dispatcher, usernames: Vec<String>) {
    let counts = blocking(db, move |db| {
        let mut counts = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some(user) = db.get_user_by_username(&username)? {
                counts.push((username, db.count_contracts_for(user.id)?));
            }
        }
        Ok(counts)
    })
    .await;

    match counts {
        Ok(counts) => {
            for (username, count) in counts {
                dispatcher
                    .publish(&Group::Contracts(username), RelayEvent::ContractCountUpdate { count })
                    .await;
            }
        }
        Err(e) => warn!("contract count broadcast skipped: {}", e),
    }
}

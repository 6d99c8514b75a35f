use anyhow::Result;
use greenpact_types::events::{RoomUnread, UnreadSummary};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{OptionalExt, USER_COLUMNS, new_id, now, time_col, user_at, uuid_col};
use crate::Database;
use crate::models::{MessageRow, NotificationRow, PostedMessage, RoomPeerRow, RoomRow, UserRow};

impl Database {
    // -- Rooms --

    /// Creates a room named `name` with the given participants.
    pub fn create_room(&self, name: &str, participants: &[Uuid]) -> Result<RoomRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = new_id();
            tx.execute(
                "INSERT INTO chat_rooms (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id, name, now()],
            )?;
            for user_id in participants {
                tx.execute(
                    "INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?1, ?2)",
                    params![id, user_id.to_string()],
                )?;
            }
            let room = query_room(&tx, name)?.ok_or_else(|| anyhow::anyhow!("room {} missing after insert", name))?;
            tx.commit()?;
            Ok(room)
        })
    }

    pub fn get_room(&self, name: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, name))
    }

    /// An existing room holding exactly these two users.
    pub fn find_room_between(&self, a: Uuid, b: Uuid) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT r.id, r.name, r.created_at FROM chat_rooms r
                 WHERE EXISTS (SELECT 1 FROM room_participants WHERE room_id = r.id AND user_id = ?1)
                   AND EXISTS (SELECT 1 FROM room_participants WHERE room_id = r.id AND user_id = ?2)
                   AND (SELECT COUNT(*) FROM room_participants WHERE room_id = r.id) = 2
                 ORDER BY r.created_at
                 LIMIT 1",
                params![a.to_string(), b.to_string()],
                room_from_row,
            )
            .optional()
        })
    }

    pub fn is_participant(&self, room: &str, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM room_participants rp JOIN chat_rooms r ON r.id = rp.room_id
                     WHERE r.name = ?1 AND rp.user_id = ?2",
                    params![room, user_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn room_participants(&self, room: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| query_participants(conn, room))
    }

    /// Rooms the user sits in, each with the other participant's name and image.
    pub fn list_rooms_for(&self, user_id: Uuid) -> Result<Vec<RoomPeerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name, ou.username, op.name, op.image
                 FROM chat_rooms r
                 JOIN room_participants me ON me.room_id = r.id AND me.user_id = ?1
                 LEFT JOIN room_participants other ON other.room_id = r.id AND other.user_id <> ?1
                 LEFT JOIN users ou ON ou.id = other.user_id
                 LEFT JOIN profiles op ON op.user_id = ou.id
                 ORDER BY r.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(RoomPeerRow {
                        name: row.get(0)?,
                        peer_username: row.get(1)?,
                        peer_name: row.get(2)?,
                        peer_image: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Appends a message and a notification row for every other participant,
    /// in one transaction. Returns the stored message and its recipients.
    pub fn post_message(&self, room: &str, sender_id: Uuid, content: &str) -> Result<PostedMessage> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let room_row = query_room(&tx, room)?.ok_or_else(|| anyhow::anyhow!("Room not found: {}", room))?;
            let ts = now();

            tx.execute(
                "INSERT INTO chat_messages (room_id, sender_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![room_row.id.to_string(), sender_id.to_string(), content, ts],
            )?;
            let seq = tx.last_insert_rowid();

            let recipients: Vec<UserRow> = query_participants(&tx, room)?
                .into_iter()
                .filter(|u| u.id != sender_id)
                .collect();
            for recipient in &recipients {
                tx.execute(
                    "INSERT INTO notifications (recipient_id, sender_id, room_id, message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![recipient.id.to_string(), sender_id.to_string(), room_row.id.to_string(), content, ts],
                )?;
            }

            let message = query_message(&tx, seq)?.ok_or_else(|| anyhow::anyhow!("message {} missing after insert", seq))?;
            tx.commit()?;
            Ok(PostedMessage { message, recipients })
        })
    }

    /// The last `limit` messages of a room, oldest first.
    pub fn recent_messages(&self, room: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM (
                    SELECT m.seq, r.name, u.username, m.content, m.created_at
                    FROM chat_messages m
                    JOIN chat_rooms r ON r.id = m.room_id
                    JOIN users u ON u.id = m.sender_id
                    WHERE r.name = ?1
                    ORDER BY m.seq DESC
                    LIMIT ?2
                 ) ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![room, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    /// Total unread count plus, per room with unread notifications, the
    /// latest notification text and that room's count.
    pub fn unread_summary(&self, user_id: Uuid) -> Result<UnreadSummary> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name,
                        (SELECT n2.message FROM notifications n2
                         WHERE n2.recipient_id = ?1 AND n2.room_id = r.id
                         ORDER BY n2.seq DESC LIMIT 1),
                        COUNT(*)
                 FROM notifications n
                 JOIN chat_rooms r ON r.id = n.room_id
                 WHERE n.recipient_id = ?1 AND n.is_read = 0
                 GROUP BY r.id
                 ORDER BY MAX(n.seq) DESC",
            )?;
            let rooms = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(RoomUnread {
                        room: row.get(0)?,
                        message: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        unread: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let total_unread = rooms.iter().map(|r| r.unread).sum();
            Ok(UnreadSummary { total_unread, rooms })
        })
    }

    /// Marks every notification the user got in `room` as read.
    pub fn mark_room_read(&self, user_id: Uuid, room: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE recipient_id = ?1 AND is_read = 0
                   AND room_id = (SELECT id FROM chat_rooms WHERE name = ?2)",
                params![user_id.to_string(), room],
            )?;
            Ok(n)
        })
    }

    pub fn get_notification(&self, seq: i64) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT n.seq, n.recipient_id, u.username, r.name, n.message, n.is_read, n.created_at
                 FROM notifications n
                 JOIN users u ON u.id = n.sender_id
                 JOIN chat_rooms r ON r.id = n.room_id
                 WHERE n.seq = ?1",
                [seq],
                notification_from_row,
            )
            .optional()
        })
    }

    /// Read state only moves forward; an already read row stays read.
    pub fn mark_notification_read(&self, seq: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE notifications SET is_read = 1 WHERE seq = ?1", [seq])?;
            Ok(())
        })
    }

    pub fn list_unread_notifications(&self, user_id: Uuid) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.seq, n.recipient_id, u.username, r.name, n.message, n.is_read, n.created_at
                 FROM notifications n
                 JOIN users u ON u.id = n.sender_id
                 JOIN chat_rooms r ON r.id = n.room_id
                 WHERE n.recipient_id = ?1 AND n.is_read = 0
                 ORDER BY n.seq DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_room(conn: &Connection, name: &str) -> Result<Option<RoomRow>> {
    conn.query_row(
        "SELECT id, name, created_at FROM chat_rooms WHERE name = ?1",
        [name],
        room_from_row,
    )
    .optional()
}

fn query_participants(conn: &Connection, room: &str) -> Result<Vec<UserRow>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u
         JOIN room_participants rp ON rp.user_id = u.id
         JOIN chat_rooms r ON r.id = rp.room_id
         WHERE r.name = ?1
         ORDER BY u.username"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([room], |row| user_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_message(conn: &Connection, seq: i64) -> Result<Option<MessageRow>> {
    conn.query_row(
        "SELECT m.seq, r.name, u.username, m.content, m.created_at
         FROM chat_messages m
         JOIN chat_rooms r ON r.id = m.room_id
         JOIN users u ON u.id = m.sender_id
         WHERE m.seq = ?1",
        [seq],
        message_from_row,
    )
    .optional()
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        created_at: time_col(row, 2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        room: row.get(1)?,
        sender_username: row.get(2)?,
        content: row.get(3)?,
        created_at: time_col(row, 4)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        seq: row.get(0)?,
        recipient_id: uuid_col(row, 1)?,
        sender_username: row.get(2)?,
        room: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        created_at: time_col(row, 6)?,
    })
}

use async_trait::async_trait;
use tracing::info;

use greenpact_types::events::{Group, NotificationAction, NotificationCommand, RelayEvent, UnreadSummary};

use crate::Gateway;
use crate::auth::resolve_user;
use crate::connection::{ChannelError, ChannelHandler, ChannelResult, parse_payload};
use crate::relay::unread_summary;
use crate::session::Session;
use crate::store::blocking;

/// Personal unread counter feed. The first payload must carry a token; after
/// that every payload and every relayed summary pushes a fresh summary.
pub struct NotificationChannel {
    gateway: Gateway,
}

impl NotificationChannel {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ChannelHandler for NotificationChannel {
    type Frame = UnreadSummary;

    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn on_message(&mut self, session: &mut Session, text: &str) -> ChannelResult<UnreadSummary> {
        let cmd: NotificationCommand = parse_payload(text)?;

        let user = match session.user().cloned() {
            Some(user) => user,
            None => {
                let token = cmd.token.as_deref().ok_or(ChannelError::Rejected)?;
                let user = resolve_user(&self.gateway.db, &self.gateway.jwt_secret, token)
                    .await
                    .ok_or(ChannelError::Rejected)?;
                session.authenticate(user.clone());
                user
            }
        };

        let group = Group::Notifications(user.username.clone());
        if !session.is_member(&group) {
            session.join(group).await;
            info!("{} ({}) subscribed to notifications", user.username, user.id);
        }

        if let Some(NotificationAction::MarkAsRead) = cmd.action {
            let room = cmd
                .room_name
                .ok_or_else(|| ChannelError::Failed("room_name is required".into()))?;
            let user_id = user.id;
            blocking(&self.gateway.db, move |db| db.mark_room_read(user_id, &room)).await?;
        }

        Ok(vec![unread_summary(&self.gateway.db, user.id).await?])
    }

    /// A relayed summary only signals that something changed; the counts are
    /// read again so a queued event never overwrites a newer mark-as-read.
    async fn on_event(&mut self, session: &mut Session, event: RelayEvent) -> ChannelResult<UnreadSummary> {
        match (event, session.user().map(|user| user.id)) {
            (RelayEvent::UnreadSummary(_), Some(user_id)) => Ok(vec![unread_summary(&self.gateway.db, user_id).await?]),
            _ => Ok(Vec::new()),
        }
    }
}

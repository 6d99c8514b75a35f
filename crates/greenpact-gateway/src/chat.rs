use async_trait::async_trait;
use tracing::info;

use greenpact_types::events::{ChatCommand, ChatFrame, Group, RelayEvent};

use crate::Gateway;
use crate::auth::resolve_user;
use crate::connection::{ChannelError, ChannelHandler, ChannelResult, parse_payload};
use crate::relay::{EMPTY_MESSAGE, chat_history, chat_text, deliver_chat_message};
use crate::session::Session;
use crate::store::blocking;

/// `Connecting -> Joined(room) -> Active`. The token arrives either with the
/// upgrade request or in the first payload.
pub struct ChatChannel {
    gateway: Gateway,
    room: String,
}

impl ChatChannel {
    pub fn new(gateway: Gateway, room: String) -> Self {
        Self { gateway, room }
    }

    fn group(&self) -> Group {
        Group::Room(self.room.clone())
    }

    /// Only the room's participants may join. Returns the history frame.
    async fn join(&self, session: &mut Session) -> Result<ChatFrame, ChannelError> {
        let Some(user) = session.user().cloned() else {
            return Err(ChannelError::Rejected);
        };

        let room = self.room.clone();
        let allowed = blocking(&self.gateway.db, move |db| db.is_participant(&room, user.id)).await?;
        if !allowed {
            info!("{} is not a participant of room {}", user.username, self.room);
            return Err(ChannelError::Rejected);
        }

        session.join(self.group()).await;
        info!("{} ({}) joined room {}", user.username, user.id, self.room);

        let messages = chat_history(&self.gateway.db, &self.room).await?;
        Ok(ChatFrame::History { messages })
    }
}

#[async_trait]
impl ChannelHandler for ChatChannel {
    type Frame = ChatFrame;

    fn name(&self) -> &'static str {
        "chat"
    }

    async fn on_open(&mut self, session: &mut Session) -> ChannelResult<ChatFrame> {
        if session.user().is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![self.join(session).await?])
    }

    async fn on_message(&mut self, session: &mut Session, text: &str) -> ChannelResult<ChatFrame> {
        let cmd: ChatCommand = parse_payload(text)?;
        let mut frames = Vec::new();

        if !session.is_member(&self.group()) {
            if session.user().is_none() {
                let token = cmd.token.as_deref().ok_or(ChannelError::Rejected)?;
                let user = resolve_user(&self.gateway.db, &self.gateway.jwt_secret, token)
                    .await
                    .ok_or(ChannelError::Rejected)?;
                session.authenticate(user);
            }
            frames.push(self.join(session).await?);
        }

        if let Some(message) = cmd.message {
            let message = chat_text(&message).ok_or_else(|| ChannelError::Failed(EMPTY_MESSAGE.into()))?;
            let sender = session.user().cloned().ok_or(ChannelError::Rejected)?;
            // The echo comes back through the room group like everyone else's copy.
            deliver_chat_message(&self.gateway.db, session.dispatcher(), &self.room, &sender, message).await?;
        }

        Ok(frames)
    }

    async fn on_event(&mut self, _session: &mut Session, event: RelayEvent) -> ChannelResult<ChatFrame> {
        match event {
            RelayEvent::NewChatMessage { room, line } if room == self.room => Ok(vec![ChatFrame::Message(line)]),
            _ => Ok(Vec::new()),
        }
    }
}

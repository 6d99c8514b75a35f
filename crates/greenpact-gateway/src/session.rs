use std::collections::HashSet;

use uuid::Uuid;

use greenpact_types::events::Group;
use greenpact_types::models::Role;

use crate::dispatcher::Dispatcher;

/// Authenticated identity behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Per-connection state, owned by the connection's task. Group membership
/// changes only through here, so a connection never alters another's.
pub struct Session {
    conn_id: Uuid,
    user: Option<SessionUser>,
    dispatcher: Dispatcher,
    groups: HashSet<Group>,
}

impl Session {
    pub fn new(conn_id: Uuid, dispatcher: Dispatcher, user: Option<SessionUser>) -> Self {
        Self {
            conn_id,
            user,
            dispatcher,
            groups: HashSet::new(),
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn authenticate(&mut self, user: SessionUser) {
        self.user = Some(user);
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_member(&self, group: &Group) -> bool {
        self.groups.contains(group)
    }

    pub async fn join(&mut self, group: Group) {
        if self.groups.contains(&group) {
            return;
        }
        self.dispatcher.join(&group, self.conn_id).await;
        self.groups.insert(group);
    }

    pub async fn leave(&mut self, group: &Group) {
        if self.groups.remove(group) {
            self.dispatcher.leave(group, self.conn_id).await;
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use greenpact_types::events::{Group, RelayEvent};

/// In-process broadcast fabric: named groups of connection mailboxes.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// One unbounded mailbox per live connection: conn_id -> sender
    mailboxes: RwLock<HashMap<Uuid, mpsc::UnboundedSender<RelayEvent>>>,

    /// Group key -> member connection ids
    groups: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns (conn_id, mailbox receiver).
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<RelayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.mailboxes.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop the connection's mailbox and every group membership it held.
    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.mailboxes.write().await.remove(&conn_id);
        self.leave_all(conn_id).await;
    }

    pub async fn join(&self, group: &Group, conn_id: Uuid) {
        let key = group.key();
        let mut groups = self.inner.groups.write().await;
        let members = groups.entry(key.clone()).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
            debug!("{} joined {} ({} members)", conn_id, key, members.len());
        }
    }

    pub async fn leave(&self, group: &Group, conn_id: Uuid) {
        let key = group.key();
        let mut groups = self.inner.groups.write().await;
        if let Some(members) = groups.get_mut(&key) {
            members.retain(|id| *id != conn_id);
            if members.is_empty() {
                groups.remove(&key);
            }
        }
    }

    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut groups = self.inner.groups.write().await;
        groups.retain(|_, members| {
            members.retain(|id| *id != conn_id);
            !members.is_empty()
        });
    }

    /// Send an event to every member of the group. Returns how many
    /// mailboxes accepted it; zero when nobody is listening.
    pub async fn publish(&self, group: &Group, event: RelayEvent) -> usize {
        let key = group.key();
        let groups = self.inner.groups.read().await;
        let Some(members) = groups.get(&key) else {
            return 0;
        };

        let mailboxes = self.inner.mailboxes.read().await;
        let delivered = members
            .iter()
            .filter_map(|id| mailboxes.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count();
        debug!("published to {}: {} of {} members", key, delivered, members.len());
        delivered
    }

    /// Connection ids currently joined to the group.
    pub async fn members(&self, group: &Group) -> Vec<Uuid> {
        self.inner
            .groups
            .read()
            .await
            .get(&group.key())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(n: i64) -> RelayEvent {
        RelayEvent::ContractCountUpdate { count: n }
    }

    #[tokio::test]
    async fn publish_reaches_only_joined_members() {
        let dispatcher = Dispatcher::new();
        let group = Group::Contracts("ravi".into());
        let (a, mut rx_a) = dispatcher.register().await;
        let (_b, mut rx_b) = dispatcher.register().await;

        dispatcher.join(&group, a).await;
        assert_eq!(dispatcher.publish(&group, count(3)).await, 1);

        assert!(matches!(rx_a.try_recv(), Ok(RelayEvent::ContractCountUpdate { count: 3 })));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn joining_twice_delivers_once() {
        let dispatcher = Dispatcher::new();
        let group = Group::Room("r1".into());
        let (a, mut rx) = dispatcher.register().await;

        dispatcher.join(&group, a).await;
        dispatcher.join(&group, a).await;
        assert_eq!(dispatcher.publish(&group, count(1)).await, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_every_membership() {
        let dispatcher = Dispatcher::new();
        let room = Group::Room("r1".into());
        let inbox = Group::Notifications("ravi".into());
        let (a, _rx) = dispatcher.register().await;
        let (b, _rx_b) = dispatcher.register().await;

        dispatcher.join(&room, a).await;
        dispatcher.join(&inbox, a).await;
        dispatcher.join(&room, b).await;
        dispatcher.unregister(a).await;

        assert_eq!(dispatcher.members(&room).await, vec![b]);
        assert!(dispatcher.members(&inbox).await.is_empty());
        assert_eq!(dispatcher.publish(&inbox, count(0)).await, 0);
    }

    #[tokio::test]
    async fn leave_is_scoped_to_one_group() {
        let dispatcher = Dispatcher::new();
        let room = Group::Room("r1".into());
        let other = Group::Room("r2".into());
        let (a, _rx) = dispatcher.register().await;

        dispatcher.join(&room, a).await;
        dispatcher.join(&other, a).await;
        dispatcher.leave(&room, a).await;

        assert!(dispatcher.members(&room).await.is_empty());
        assert_eq!(dispatcher.members(&other).await, vec![a]);
    }
}

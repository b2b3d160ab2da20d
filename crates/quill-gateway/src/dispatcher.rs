use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use quill_types::events::GatewayEvent;

/// Routes events to the live connections of each account.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// account_id -> one sender per open connection (tabs, devices)
    connections: RwLock<HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<GatewayEvent>)>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an account. Returns (conn_id, receiver).
    pub async fn register(&self, account_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .entry(account_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    /// Drop one connection; the account's other connections stay registered.
    pub async fn unregister(&self, account_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        if let Some(senders) = connections.get_mut(&account_id) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                connections.remove(&account_id);
            }
        }
    }

    /// Send an event to every connection of an account. Returns how many
    /// connections accepted it; zero means the account is offline.
    pub async fn send_to(&self, account_id: Uuid, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let Some(senders) = connections.get(&account_id) else {
            return 0;
        };
        senders
            .iter()
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn is_online(&self, account_id: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&account_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_connection_of_an_account() {
        let dispatcher = Dispatcher::new();
        let account = Uuid::new_v4();
        let (_c1, mut rx1) = dispatcher.register(account).await;
        let (_c2, mut rx2) = dispatcher.register(account).await;

        let delivered = dispatcher.send_to(account, GatewayEvent::CreditUpdate { credit: 7 }).await;
        assert_eq!(delivered, 2);
        assert!(matches!(rx1.recv().await, Some(GatewayEvent::CreditUpdate { credit: 7 })));
        assert!(matches!(rx2.recv().await, Some(GatewayEvent::CreditUpdate { credit: 7 })));
    }

    #[tokio::test]
    async fn unregister_only_drops_its_own_connection() {
        let dispatcher = Dispatcher::new();
        let account = Uuid::new_v4();
        let (c1, _rx1) = dispatcher.register(account).await;
        let (c2, _rx2) = dispatcher.register(account).await;

        dispatcher.unregister(account, c1).await;
        assert!(dispatcher.is_online(account).await);
        assert_eq!(dispatcher.connection_count().await, 1);

        dispatcher.unregister(account, c2).await;
        assert!(!dispatcher.is_online(account).await);
    }

    #[tokio::test]
    async fn offline_accounts_receive_nothing() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher
            .send_to(Uuid::new_v4(), GatewayEvent::CreditUpdate { credit: 1 })
            .await;
        assert_eq!(delivered, 0);
    }
}

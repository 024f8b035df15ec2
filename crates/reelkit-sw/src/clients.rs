//! Connected application instances and the claim operation.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::RwLock;
use url::Url;

/// Unique identifier for a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An open application instance (a page or webview).
#[derive(Debug, Clone)]
pub struct Client {
    /// Instance identifier.
    pub id: ClientId,
    /// URL the instance is showing.
    pub url: Url,
    /// Store name of the proxy version controlling this instance, if any.
    pub controller: Option<String>,
}

/// Registry of open application instances.
///
/// The host connects a client when a page opens and disconnects it when the
/// page closes. Activation claims every client at once, so a new version
/// takes control without a reload.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open instance. Returns its ID.
    pub async fn connect(&self, url: Url) -> ClientId {
        let id = ClientId::next();
        self.clients.write().await.insert(
            id,
            Client {
                id,
                url,
                controller: None,
            },
        );
        id
    }

    /// Remove an instance. Returns whether it was present.
    pub async fn disconnect(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    /// Snapshot one client.
    pub async fn get(&self, id: ClientId) -> Option<Client> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Number of connected clients.
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Put every connected client under the given controller. Returns how
    /// many changed hands.
    pub async fn claim_all(&self, controller: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut() {
            if client.controller.as_deref() != Some(controller) {
                client.controller = Some(controller.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Number of clients currently controlled by `controller`.
    pub async fn controlled_by(&self, controller: &str) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|client| client.controller.as_deref() == Some(controller))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_connect_get_disconnect() {
        let registry = ClientRegistry::new();
        let id = registry.connect(url("https://app.logreel.test/")).await;

        let client = registry.get(id).await.unwrap();
        assert_eq!(client.id, id);
        assert!(client.controller.is_none());
        assert_eq!(registry.count().await, 1);

        assert!(registry.disconnect(id).await);
        assert!(!registry.disconnect(id).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = ClientRegistry::new();
        let a = registry.connect(url("https://app.logreel.test/")).await;
        let b = registry.connect(url("https://app.logreel.test/reels")).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_claim_all_takes_every_client() {
        let registry = ClientRegistry::new();
        let a = registry.connect(url("https://app.logreel.test/")).await;
        let b = registry.connect(url("https://app.logreel.test/reels")).await;

        let claimed = registry.claim_all("logreelpro-cache-1.0.0").await;
        assert_eq!(claimed, 2);
        assert_eq!(registry.controlled_by("logreelpro-cache-1.0.0").await, 2);

        let client_a = registry.get(a).await.unwrap();
        let client_b = registry.get(b).await.unwrap();
        assert_eq!(client_a.controller.as_deref(), Some("logreelpro-cache-1.0.0"));
        assert_eq!(client_b.controller.as_deref(), Some("logreelpro-cache-1.0.0"));
    }

    #[tokio::test]
    async fn test_claim_is_idempotent_per_controller() {
        let registry = ClientRegistry::new();
        registry.connect(url("https://app.logreel.test/")).await;

        assert_eq!(registry.claim_all("logreelpro-cache-1.0.0").await, 1);
        assert_eq!(registry.claim_all("logreelpro-cache-1.0.0").await, 0);

        // A newer version re-claims the same client.
        assert_eq!(registry.claim_all("logreelpro-cache-1.1.0").await, 1);
        assert_eq!(registry.controlled_by("logreelpro-cache-1.0.0").await, 0);
        assert_eq!(registry.controlled_by("logreelpro-cache-1.1.0").await, 1);
    }
}

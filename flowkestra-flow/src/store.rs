use async_trait::async_trait;
use chrono::Utc;
use flowkestra_core::{AuthError, FlowDefinition, FlowInstance, FlowStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// An in-process [`FlowStore`].
///
/// Every mutation happens under a single write lock, so a version check and
/// the write it guards are atomic, and an update racing the expiry sweep
/// either commits or observes `FlowNotFound`.
#[derive(Default)]
pub struct MemoryFlowStore {
    instances: RwLock<HashMap<String, FlowInstance>>,
}

impl MemoryFlowStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances, expired ones included.
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Whether the store holds no instances.
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn create(
        &self,
        app_id: &str,
        definition: FlowDefinition,
        ttl: chrono::Duration,
    ) -> Result<FlowInstance, AuthError> {
        let mut instances = self.instances.write().await;
        let flow_id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !instances.contains_key(&candidate) {
                break candidate;
            }
        };
        let instance = FlowInstance::new(flow_id.clone(), app_id, definition, ttl);
        instances.insert(flow_id, instance.clone());
        Ok(instance)
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowInstance>, AuthError> {
        let now = Utc::now();
        Ok(self
            .instances
            .read()
            .await
            .get(flow_id)
            .filter(|i| !i.is_expired_at(now))
            .cloned())
    }

    async fn update(&self, instance: &FlowInstance) -> Result<FlowInstance, AuthError> {
        let now = Utc::now();
        let mut instances = self.instances.write().await;
        let expired = match instances.get(&instance.flow_id) {
            Some(stored) => stored.is_expired_at(now),
            None => return Err(AuthError::FlowNotFound(instance.flow_id.clone())),
        };
        if expired {
            instances.remove(&instance.flow_id);
            return Err(AuthError::FlowNotFound(instance.flow_id.clone()));
        }
        let stored = instances
            .get_mut(&instance.flow_id)
            .ok_or_else(|| AuthError::FlowNotFound(instance.flow_id.clone()))?;
        if stored.version != instance.version {
            return Err(AuthError::FlowConflict(instance.flow_id.clone()));
        }
        *stored = instance.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn expire(&self, flow_id: &str) -> Result<(), AuthError> {
        self.instances.write().await.remove(flow_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, AuthError> {
        let now = Utc::now();
        let mut instances = self.instances.write().await;
        let before = instances.len();
        instances.retain(|_, i| !i.is_expired_at(now));
        Ok(before - instances.len())
    }
}

/// Shortest interval the sweeper runs at; smaller values are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Periodically drops expired instances from `store`.
///
/// Runs until the returned handle is aborted.
pub fn spawn_expiry_sweeper(store: Arc<dyn FlowStore>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => log::debug!("Expired {n} flow instance(s)"),
                Err(e) => log::error!("Flow expiry sweep failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowkestra_core::{FlowStatus, StepSpec};

    fn definition() -> FlowDefinition {
        FlowDefinition::new("basic", vec![StepSpec::new("basic")])
    }

    #[tokio::test]
    async fn creates_unique_ids() {
        let store = MemoryFlowStore::new();
        let a = store
            .create("app", definition(), chrono::Duration::minutes(5))
            .await
            .unwrap();
        let b = store
            .create("app", definition(), chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_ne!(a.flow_id, b.flow_id);
        assert_eq!(a.status, FlowStatus::Incomplete);
        assert_eq!(a.step_index, 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryFlowStore::new();
        let created = store
            .create("app", definition(), chrono::Duration::minutes(5))
            .await
            .unwrap();

        let mut first = created.clone();
        first.step_index = 1;
        let committed = store.update(&first).await.unwrap();
        assert_eq!(committed.version, 1);

        let mut second = created;
        second.step_index = 1;
        assert!(matches!(
            store.update(&second).await,
            Err(AuthError::FlowConflict(_))
        ));
    }

    #[tokio::test]
    async fn expired_instances_are_invisible() {
        let store = MemoryFlowStore::new();
        let created = store
            .create("app", definition(), chrono::Duration::zero())
            .await
            .unwrap();

        assert!(store.get(&created.flow_id).await.unwrap().is_none());
        assert!(matches!(
            store.update(&created).await,
            Err(AuthError::FlowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let store = MemoryFlowStore::new();
        store
            .create("app", definition(), chrono::Duration::zero())
            .await
            .unwrap();
        let live = store
            .create("app", definition(), chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&live.flow_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expire_removes_instance() {
        let store = MemoryFlowStore::new();
        let created = store
            .create("app", definition(), chrono::Duration::minutes(5))
            .await
            .unwrap();
        store.expire(&created.flow_id).await.unwrap();
        assert!(store.get(&created.flow_id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn sweeper_purges_in_background() {
        let store = Arc::new(MemoryFlowStore::new());
        store
            .create("app", definition(), chrono::Duration::zero())
            .await
            .unwrap();

        let handle = spawn_expiry_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn zero_interval_is_raised_instead_of_panicking() {
        let store = Arc::new(MemoryFlowStore::new());
        store
            .create("app", definition(), chrono::Duration::zero())
            .await
            .unwrap();

        let handle = spawn_expiry_sweeper(store.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(store.is_empty().await);
    }
}

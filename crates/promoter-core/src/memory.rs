use crate::bootstrap::{default_workflow_from_environments, WorkflowBootstrap};
use crate::crd::{Environment, PipelineActivity, Workflow};
use crate::error::{PromoterError, Result};
use crate::namespace::EnvironmentApi;
use crate::store::{ResourceStore, WatchEvent, WatchStream};
use async_trait::async_trait;
use futures::StreamExt;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const WATCH_CAPACITY: usize = 256;

/// A single-namespace resource store held in memory.
///
/// Every apply stamps a fresh, increasing `resourceVersion` and is broadcast
/// to open watches. Used to run the controller without a cluster.
pub struct MemoryStore {
    namespace: String,
    state: Mutex<State>,
    workflows_tx: broadcast::Sender<WatchEvent<Workflow>>,
    activities_tx: broadcast::Sender<WatchEvent<PipelineActivity>>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct State {
    version: u64,
    workflows: BTreeMap<String, Workflow>,
    activities: BTreeMap<String, PipelineActivity>,
    environments: BTreeMap<String, Environment>,
    namespaces: BTreeSet<String>,
}

impl State {
    fn stamp<K: kube::Resource>(&mut self, obj: &mut K) {
        self.version += 1;
        obj.meta_mut().resource_version = Some(self.version.to_string());
    }
}

impl MemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        let (workflows_tx, _) = broadcast::channel(WATCH_CAPACITY);
        let (activities_tx, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            namespace: namespace.into(),
            state: Mutex::new(State::default()),
            workflows_tx,
            activities_tx,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Create or replace a workflow and notify watchers. Returns the stored copy.
    pub fn apply_workflow(&self, mut workflow: Workflow) -> Workflow {
        let mut state = self.lock();
        state.stamp(&mut workflow);
        state.workflows.insert(workflow.name_any(), workflow.clone());
        drop(state);
        // No receivers is not an error.
        let _ = self.workflows_tx.send(WatchEvent::Applied(workflow.clone()));
        workflow
    }

    pub fn delete_workflow(&self, name: &str) -> Option<Workflow> {
        let removed = self.lock().workflows.remove(name);
        if let Some(workflow) = &removed {
            let _ = self.workflows_tx.send(WatchEvent::Deleted(workflow.clone()));
        }
        removed
    }

    /// Remove a workflow without notifying watchers, as a dropped delete
    /// event would.
    #[cfg(test)]
    pub(crate) fn forget_workflow(&self, name: &str) -> Option<Workflow> {
        self.lock().workflows.remove(name)
    }

    /// Create or replace an activity and notify watchers. Returns the stored copy.
    pub fn apply_activity(&self, mut activity: PipelineActivity) -> PipelineActivity {
        let mut state = self.lock();
        state.stamp(&mut activity);
        state.activities.insert(activity.name_any(), activity.clone());
        drop(state);
        let _ = self.activities_tx.send(WatchEvent::Applied(activity.clone()));
        activity
    }

    pub fn delete_activity(&self, name: &str) -> Option<PipelineActivity> {
        let removed = self.lock().activities.remove(name);
        if let Some(activity) = &removed {
            let _ = self.activities_tx.send(WatchEvent::Deleted(activity.clone()));
        }
        removed
    }

    pub fn apply_environment(&self, mut environment: Environment) -> Environment {
        let mut state = self.lock();
        state.stamp(&mut environment);
        state
            .environments
            .insert(environment.name_any(), environment.clone());
        environment
    }

    /// Namespaces created through [`EnvironmentApi::ensure_namespace`].
    pub fn namespaces(&self) -> Vec<String> {
        self.lock().namespaces.iter().cloned().collect()
    }

    /// Make every list and get fail, as an unreachable API server would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PromoterError::store(operation, "store unavailable"));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn subscribe<K>(tx: &broadcast::Sender<WatchEvent<K>>, kind: &'static str) -> WatchStream<K>
where
    K: Clone + Send + 'static,
{
    BroadcastStream::new(tx.subscribe())
        .map(move |item| {
            item.map_err(|lagged| PromoterError::store(format!("watch {kind}"), lagged))
        })
        .boxed()
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.check_available("list workflows")?;
        Ok(self.lock().workflows.values().cloned().collect())
    }

    async fn list_activities(&self) -> Result<Vec<PipelineActivity>> {
        self.check_available("list activities")?;
        Ok(self.lock().activities.values().cloned().collect())
    }

    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>> {
        self.check_available("get activity")?;
        Ok(self.lock().activities.get(name).cloned())
    }

    async fn watch_workflows(&self) -> Result<WatchStream<Workflow>> {
        self.check_available("watch workflows")?;
        Ok(subscribe(&self.workflows_tx, "workflows"))
    }

    async fn watch_activities(&self) -> Result<WatchStream<PipelineActivity>> {
        self.check_available("watch activities")?;
        Ok(subscribe(&self.activities_tx, "activities"))
    }
}

#[async_trait]
impl EnvironmentApi for MemoryStore {
    async fn get_environment(&self, name: &str) -> Result<Option<Environment>> {
        self.check_available("get environment")?;
        Ok(self.lock().environments.get(name).cloned())
    }

    async fn list_environments(&self) -> Result<Vec<Environment>> {
        self.check_available("list environments")?;
        Ok(self.lock().environments.values().cloned().collect())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.lock().namespaces.insert(namespace.to_string());
        Ok(())
    }
}

#[async_trait]
impl WorkflowBootstrap for MemoryStore {
    async fn create_default_workflow(&self, namespace: &str, name: &str) -> Result<Workflow> {
        if namespace != self.namespace {
            return Err(PromoterError::Bootstrap {
                namespace: namespace.to_string(),
                message: format!("store only holds namespace {}", self.namespace),
            });
        }
        if let Some(existing) = self.lock().workflows.get(name).cloned() {
            return Ok(existing);
        }
        let environments = self.list_environments().await?;
        let workflow = default_workflow_from_environments(name, &environments);
        Ok(self.apply_workflow(workflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EnvironmentSpec, PipelineActivitySpec, WorkflowStep};
    use crate::types::PromotionStrategy;

    #[tokio::test]
    async fn apply_stamps_increasing_resource_versions() {
        let store = MemoryStore::new("jx");
        let a = store.apply_activity(PipelineActivity::new("a", PipelineActivitySpec::default()));
        let b = store.apply_activity(PipelineActivity::new("a", PipelineActivitySpec::default()));
        assert_eq!(a.resource_version().as_deref(), Some("1"));
        assert_eq!(b.resource_version().as_deref(), Some("2"));
        assert_eq!(store.list_activities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watch_sees_applies_and_deletes() {
        let store = MemoryStore::new("jx");
        let mut watch = store.watch_workflows().await.unwrap();
        store.apply_workflow(Workflow::with_steps("flow", vec![]));
        store.delete_workflow("flow");

        match watch.next().await {
            Some(Ok(WatchEvent::Applied(w))) => assert_eq!(w.name_any(), "flow"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(watch.next().await, Some(Ok(WatchEvent::Deleted(_)))));
    }

    #[tokio::test]
    async fn unavailable_store_fails_lists() {
        let store = MemoryStore::new("jx");
        store.set_unavailable(true);
        assert!(matches!(
            store.list_workflows().await,
            Err(PromoterError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = MemoryStore::new("jx");
        store.apply_environment(Environment::new(
            "staging",
            EnvironmentSpec {
                namespace: "jx-staging".into(),
                promotion_strategy: PromotionStrategy::Automatic,
                ..Default::default()
            },
        ));
        let first = store.create_default_workflow("jx", "default").await.unwrap();
        assert_eq!(first.spec.steps, vec![WorkflowStep::promote("staging", &[])]);

        let second = store.create_default_workflow("jx", "default").await.unwrap();
        assert_eq!(first.resource_version(), second.resource_version());
        assert_eq!(store.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_rejects_other_namespaces() {
        let store = MemoryStore::new("jx");
        assert!(store.create_default_workflow("other", "default").await.is_err());
    }
}

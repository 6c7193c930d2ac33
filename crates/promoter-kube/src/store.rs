use async_trait::async_trait;
use futures::{future, StreamExt};
use kube::api::ListParams;
use kube::runtime::watcher::{self, watcher, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource};
use promoter_core::crd::{PipelineActivity, Workflow};
use promoter_core::store::{ResourceStore, WatchEvent, WatchStream};
use promoter_core::{PromoterError, Result};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

/// [`ResourceStore`] backed by the Kubernetes API for one namespace.
#[derive(Clone)]
pub struct KubeStore {
    namespace: String,
    workflows: Api<Workflow>,
    activities: Api<PipelineActivity>,
}

impl KubeStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            workflows: Api::namespaced(client.clone(), namespace),
            activities: Api::namespaced(client, namespace),
        }
    }
}

/// Translate a watcher event. Init markers carry no object and are dropped;
/// objects replayed during a relist count as applies.
pub(crate) fn convert<K>(event: watcher::Event<K>) -> Option<WatchEvent<K>> {
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            Some(WatchEvent::Applied(obj))
        }
        watcher::Event::Delete(obj) => Some(WatchEvent::Deleted(obj)),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

fn watch_stream<K>(api: Api<K>, kind: &'static str) -> WatchStream<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    watcher(api, Config::default())
        .default_backoff()
        .filter_map(move |event| {
            future::ready(match event {
                Ok(event) => convert(event).map(Ok),
                Err(e) => Some(Err(PromoterError::store(format!("watch {kind}"), e))),
            })
        })
        .boxed()
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let list = self
            .workflows
            .list(&ListParams::default())
            .await
            .map_err(|e| PromoterError::store("list workflows", e))?;
        debug!(namespace = %self.namespace, count = list.items.len(), "listed workflows");
        Ok(list.items)
    }

    async fn list_activities(&self) -> Result<Vec<PipelineActivity>> {
        let list = self
            .activities
            .list(&ListParams::default())
            .await
            .map_err(|e| PromoterError::store("list pipeline activities", e))?;
        debug!(namespace = %self.namespace, count = list.items.len(), "listed pipeline activities");
        Ok(list.items)
    }

    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>> {
        self.activities
            .get_opt(name)
            .await
            .map_err(|e| PromoterError::store(format!("get pipeline activity {name}"), e))
    }

    async fn watch_workflows(&self) -> Result<WatchStream<Workflow>> {
        info!(namespace = %self.namespace, "watching workflows");
        Ok(watch_stream(self.workflows.clone(), "workflows"))
    }

    async fn watch_activities(&self) -> Result<WatchStream<PipelineActivity>> {
        info!(namespace = %self.namespace, "watching pipeline activities");
        Ok(watch_stream(self.activities.clone(), "pipeline activities"))
    }
}

use crate::crd::{PipelineActivity, Workflow};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A change notification from a watch.
///
/// Adds and updates are not distinguished: both carry the full object.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Applied(K),
    Deleted(K),
}

pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// Source of workflow and activity state for one namespace.
///
/// Watches are at-least-once and may deliver events out of order or
/// replay objects after a reconnect. A stream ending is reported by the
/// caller as [`crate::PromoterError::WatchEnded`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    async fn list_activities(&self) -> Result<Vec<PipelineActivity>>;

    /// Current copy of one activity, if it still exists.
    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>>;

    async fn watch_workflows(&self) -> Result<WatchStream<Workflow>>;

    async fn watch_activities(&self) -> Result<WatchStream<PipelineActivity>>;
}

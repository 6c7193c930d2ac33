use crate::decision::PromotionIntent;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments passed to the promotion engine for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteRequest {
    pub application: String,
    pub environment: String,
    pub pipeline: String,
    pub build: String,
    pub version: String,
    /// Target namespace when no environment is named.
    pub namespace: Option<String>,
    /// Never prompt.
    pub batch_mode: bool,
    /// Promote from the remote activity record rather than a local checkout.
    pub ignore_local_files: bool,
}

impl PromoteRequest {
    /// A non-interactive request as issued by the controller.
    pub fn from_intent(intent: &PromotionIntent) -> Self {
        Self {
            application: intent.application.clone(),
            environment: intent.environment.clone(),
            pipeline: intent.pipeline.clone(),
            build: intent.build.clone(),
            version: intent.version.clone(),
            namespace: None,
            batch_mode: true,
            ignore_local_files: true,
        }
    }
}

/// External capability that raises the promotion pull request.
///
/// Calls may be repeated for the same activity and environment before the
/// pull request shows up on the activity, so implementations have to
/// tolerate duplicates.
#[async_trait]
pub trait PromotionEngine: Send + Sync {
    async fn promote(&self, request: &PromoteRequest) -> Result<()>;
}

/// Outcome of one trigger pass over an activity.
#[derive(Debug, Clone)]
pub struct TriggerReport {
    pub activity: String,
    pub attempted: Vec<String>,
    /// `(environment, error message)` for every failed promotion.
    pub failed: Vec<(String, String)>,
    pub at: DateTime<Utc>,
}

impl TriggerReport {
    pub fn succeeded(&self) -> usize {
        self.attempted.len() - self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Invokes the promotion engine for each intent in order.
#[derive(Clone)]
pub struct PromotionTrigger {
    engine: Arc<dyn PromotionEngine>,
}

impl PromotionTrigger {
    pub fn new(engine: Arc<dyn PromotionEngine>) -> Self {
        Self { engine }
    }

    /// Run every intent. A failure is logged and the pass moves on to the
    /// next intent; the next event for the activity retries it.
    pub async fn fire(&self, activity: &str, intents: &[PromotionIntent]) -> TriggerReport {
        let mut attempted = Vec::with_capacity(intents.len());
        let mut failed = Vec::new();

        for intent in intents {
            info!(
                activity = %activity,
                environment = %intent.environment,
                application = %intent.application,
                version = %intent.version,
                "creating promotion pull request"
            );
            attempted.push(intent.environment.clone());

            let request = PromoteRequest::from_intent(intent);
            if let Err(e) = self.engine.promote(&request).await {
                warn!(
                    activity = %activity,
                    environment = %intent.environment,
                    pipeline = %intent.pipeline,
                    build = %intent.build,
                    error = %e,
                    "promotion failed"
                );
                failed.push((intent.environment.clone(), e.to_string()));
            }
        }

        TriggerReport {
            activity: activity.to_string(),
            attempted,
            failed,
            at: Utc::now(),
        }
    }
}

//! The controller loop: wires watch events into the workflow directory, the
//! decision engine and the promotion trigger.

use crate::crd::{is_resource_version_newer, PipelineActivity, Workflow};
use crate::decision::{Decision, DecisionEngine, SkipReason};
use crate::error::{PromoterError, Result};
use crate::store::{ResourceStore, WatchEvent, WatchStream};
use crate::trigger::{PromotionTrigger, TriggerReport};
use futures::StreamExt;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub namespace: String,
    pub resync_interval: Duration,
    pub skip_superseded_builds: bool,
}

pub struct WorkflowController {
    store: Arc<dyn ResourceStore>,
    decisions: DecisionEngine,
    trigger: PromotionTrigger,
    settings: ControllerSettings,
    /// Highest build number seen per pipeline.
    newest_builds: Mutex<HashMap<String, u64>>,
}

impl WorkflowController {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        decisions: DecisionEngine,
        trigger: PromotionTrigger,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            decisions,
            trigger,
            settings,
            newest_builds: Mutex::new(HashMap::new()),
        }
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    // -----------------------------------------------------------------------
    // Batch mode
    // -----------------------------------------------------------------------

    /// List every workflow, then evaluate every activity once.
    ///
    /// List failures are returned. Promotion failures are only reported.
    pub async fn run_once(&self) -> Result<Vec<TriggerReport>> {
        info!(namespace = %self.settings.namespace, "processing pipeline activities");
        self.resync_workflows().await?;

        let activities = self.store.list_activities().await?;
        let mut reports = Vec::new();
        for activity in activities {
            if let Some(report) = self.evaluate(&activity).await {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    // -----------------------------------------------------------------------
    // Watch mode
    // -----------------------------------------------------------------------

    /// Watch workflows and activities until one of the watches fails for
    /// good. The initial listings and watch setup are fatal.
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        info!(
            namespace = %self.settings.namespace,
            resync_secs = self.settings.resync_interval.as_secs(),
            "watching for PipelineActivity resources"
        );

        self.resync_workflows().await?;
        let workflows = self.store.watch_workflows().await?;
        let activities = self.store.watch_activities().await?;
        self.resync_activities().await?;

        let mut workflow_task = tokio::spawn(Arc::clone(&self).run_workflow_watch(workflows));
        let mut activity_task = tokio::spawn(Arc::clone(&self).run_activity_watch(activities));

        let (kind, joined) = tokio::select! {
            res = &mut workflow_task => ("workflows", res),
            res = &mut activity_task => ("activities", res),
        };
        workflow_task.abort();
        activity_task.abort();

        match joined {
            Ok(result) => result,
            Err(e) => Err(PromoterError::WatchEnded(format!("{kind}: {e}"))),
        }
    }

    async fn run_workflow_watch(self: Arc<Self>, mut events: WatchStream<Workflow>) -> Result<()> {
        let mut resync = interval(self.settings.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial list already ran.
        resync.tick().await;

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(event)) => self.on_workflow_event(event),
                    Some(Err(e)) => warn!(error = %e, "workflow watch error"),
                    None => {
                        error!("workflow watch ended");
                        return Err(PromoterError::WatchEnded("workflows".into()));
                    }
                },
                _ = resync.tick() => {
                    if let Err(e) = self.resync_workflows().await {
                        warn!(error = %e, "workflow resync failed");
                    }
                }
            }
        }
    }

    async fn run_activity_watch(
        self: Arc<Self>,
        mut events: WatchStream<PipelineActivity>,
    ) -> Result<()> {
        let mut resync = interval(self.settings.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        resync.tick().await;

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(WatchEvent::Applied(activity))) => {
                        self.on_activity(activity).await;
                    }
                    // Deleting an activity needs no action.
                    Some(Ok(WatchEvent::Deleted(activity))) => {
                        debug!(activity = %activity.name_any(), "activity deleted");
                    }
                    Some(Err(e)) => warn!(error = %e, "activity watch error"),
                    None => {
                        error!("activity watch ended");
                        return Err(PromoterError::WatchEnded("activities".into()));
                    }
                },
                _ = resync.tick() => {
                    if let Err(e) = self.resync_activities().await {
                        warn!(error = %e, "activity resync failed");
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    pub fn on_workflow_event(&self, event: WatchEvent<Workflow>) {
        let directory = self.decisions.directory();
        match event {
            WatchEvent::Applied(workflow) => {
                debug!(workflow = %workflow.name_any(), "workflow updated");
                directory.upsert(workflow);
            }
            WatchEvent::Deleted(workflow) => {
                debug!(workflow = %workflow.name_any(), "workflow removed");
                directory.remove(&workflow.name_any());
            }
        }
    }

    /// Evaluate an activity from a watch event, preferring the store's copy
    /// when it is newer than the event's.
    pub async fn on_activity(&self, activity: PipelineActivity) -> Option<TriggerReport> {
        let name = activity.name_any();
        let activity = match self.store.get_activity(&name).await {
            Ok(Some(current)) if is_newer(&current, &activity) => {
                debug!(
                    activity = %name,
                    current = ?current.resource_version(),
                    event = ?activity.resource_version(),
                    "using newer copy of activity"
                );
                current
            }
            Ok(_) => activity,
            Err(e) => {
                debug!(activity = %name, error = %e, "cannot re-read activity; using event copy");
                activity
            }
        };
        self.evaluate(&activity).await
    }

    async fn evaluate(&self, activity: &PipelineActivity) -> Option<TriggerReport> {
        let name = activity.name_any();

        if self.settings.skip_superseded_builds && self.is_superseded(activity) {
            info!(
                activity = %name,
                pipeline = %activity.spec.pipeline,
                build = %activity.spec.build,
                "skipping superseded build"
            );
            return None;
        }

        let evaluation = match self.decisions.decide(activity).await {
            Decision::Evaluate(evaluation) => evaluation,
            Decision::Skip(reason) => {
                log_skip(&name, &reason);
                return None;
            }
        };

        debug!(
            activity = %name,
            workflow = %evaluation.workflow,
            intents = evaluation.intents.len(),
            "evaluated activity"
        );
        if evaluation.all_steps_complete {
            info!(activity = %name, workflow = %evaluation.workflow, "all promotion steps complete");
        }
        if evaluation.intents.is_empty() {
            return None;
        }

        let report = self.trigger.fire(&name, &evaluation.intents).await;
        if !report.is_clean() {
            warn!(
                activity = %name,
                attempted = report.attempted.len(),
                failed = report.failed.len(),
                "some promotions failed; will retry on the next event"
            );
        }
        Some(report)
    }

    /// Record this build and report whether a newer build of the same
    /// pipeline has already been seen.
    fn is_superseded(&self, activity: &PipelineActivity) -> bool {
        let Ok(build) = activity.spec.build.parse::<u64>() else {
            return false;
        };
        let mut newest = self
            .newest_builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = newest.entry(activity.spec.pipeline.clone()).or_insert(build);
        if build < *entry {
            return true;
        }
        *entry = build;
        false
    }

    // -----------------------------------------------------------------------
    // Resync
    // -----------------------------------------------------------------------

    /// Replace the directory with a fresh listing, which also drops
    /// workflows whose delete event was missed.
    async fn resync_workflows(&self) -> Result<()> {
        let workflows = self.store.list_workflows().await?;
        let directory = self.decisions.directory();
        directory.replace_all(workflows);
        debug!(workflows = ?directory.names(), "resynced workflows");
        Ok(())
    }

    async fn resync_activities(&self) -> Result<()> {
        let activities = self.store.list_activities().await?;
        debug!(count = activities.len(), "resyncing activities");
        for activity in activities {
            self.evaluate(&activity).await;
        }
        Ok(())
    }
}

fn is_newer(a: &PipelineActivity, b: &PipelineActivity) -> bool {
    match (a.resource_version(), b.resource_version()) {
        (Some(a), Some(b)) => is_resource_version_newer(&a, &b),
        _ => false,
    }
}

fn log_skip(activity: &str, reason: &SkipReason) {
    match reason {
        SkipReason::MissingData { .. } => {
            info!(activity = %activity, reason = %reason, "ignoring activity")
        }
        SkipReason::Terminated(_) | SkipReason::NotReleaseBranch(_) => {
            debug!(activity = %activity, reason = %reason, "ignoring activity")
        }
        SkipReason::WorkflowNotFound(_) | SkipReason::BootstrapFailed { .. } => {
            warn!(activity = %activity, reason = %reason, "ignoring activity")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::WorkflowBootstrap;
    use crate::crd::{
        ActivityStep, CoreActivityStep, Environment, EnvironmentSpec, PipelineActivitySpec,
        PromoteActivityStep, PromotePullRequestStep, WorkflowStep,
    };
    use crate::directory::WorkflowDirectory;
    use crate::memory::MemoryStore;
    use crate::policy::ReleaseBranchPolicy;
    use crate::trigger::{PromoteRequest, PromotionEngine};
    use crate::types::{ActivityStatus, PromotionStrategy};
    use async_trait::async_trait;

    fn environment(name: &str, order: i32) -> Environment {
        Environment::new(
            name,
            EnvironmentSpec {
                namespace: format!("jx-{name}"),
                promotion_strategy: PromotionStrategy::Automatic,
                order,
                ..Default::default()
            },
        )
    }

    #[derive(Default)]
    struct RecordingEngine {
        requests: Mutex<Vec<PromoteRequest>>,
    }

    impl RecordingEngine {
        fn environments(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.environment.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PromotionEngine for RecordingEngine {
        async fn promote(&self, request: &PromoteRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn controller(
        store: Arc<MemoryStore>,
        engine: Arc<RecordingEngine>,
        skip_superseded_builds: bool,
    ) -> WorkflowController {
        let bootstrap: Arc<dyn WorkflowBootstrap> = store.clone();
        let decisions = DecisionEngine::new(
            Arc::new(WorkflowDirectory::new()),
            ReleaseBranchPolicy::default(),
            bootstrap,
            "jx",
            "default",
        );
        WorkflowController::new(
            store,
            decisions,
            PromotionTrigger::new(engine),
            ControllerSettings {
                namespace: "jx".into(),
                resync_interval: Duration::from_secs(600),
                skip_superseded_builds,
            },
        )
    }

    fn activity(name: &str, build: &str) -> PipelineActivity {
        PipelineActivity::new(
            name,
            PipelineActivitySpec {
                pipeline: "jstrachan/myrepo/master".into(),
                build: build.into(),
                version: format!("0.0.{build}"),
                workflow_status: ActivityStatus::Running,
                ..Default::default()
            },
        )
    }

    fn promoted(env: &str, status: ActivityStatus) -> ActivityStep {
        ActivityStep::Promote(PromoteActivityStep {
            core: CoreActivityStep {
                status,
                ..Default::default()
            },
            environment: env.into(),
            pull_request: Some(PromotePullRequestStep {
                pull_request_url: format!("https://github.com/o/environment-{env}/pull/1"),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn batch_mode_bootstraps_default_workflow() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_environment(environment("staging", 100));
        store.apply_environment(environment("production", 200));
        store.apply_activity(activity("act-1", "1"));

        let engine = Arc::new(RecordingEngine::default());
        let ctl = controller(store.clone(), engine.clone(), false);
        let reports = ctl.run_once().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(engine.environments(), vec!["staging"]);
        assert_eq!(store.list_workflows().await.unwrap().len(), 1);
        assert!(ctl.decisions().directory().get("default").is_some());
    }

    #[tokio::test]
    async fn batch_mode_uses_listed_workflows() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_workflow(Workflow::with_steps(
            "myflow",
            vec![
                WorkflowStep::promote("staging", &[]),
                WorkflowStep::promote("production", &["staging"]),
            ],
        ));
        let mut a = activity("act-1", "1");
        a.spec.workflow = "myflow".into();
        a.spec.steps = vec![promoted("staging", ActivityStatus::Succeeded)];
        store.apply_activity(a);

        let engine = Arc::new(RecordingEngine::default());
        controller(store, engine.clone(), false).run_once().await.unwrap();
        assert_eq!(engine.environments(), vec!["production"]);
    }

    #[tokio::test]
    async fn batch_mode_propagates_list_failures() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.set_unavailable(true);
        let ctl = controller(store, Arc::new(RecordingEngine::default()), false);
        assert!(matches!(
            ctl.run_once().await,
            Err(PromoterError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn workflow_events_update_directory() {
        let store = Arc::new(MemoryStore::new("jx"));
        let ctl = controller(store, Arc::new(RecordingEngine::default()), false);
        let flow = Workflow::with_steps("myflow", vec![]);

        ctl.on_workflow_event(WatchEvent::Applied(flow.clone()));
        assert!(ctl.decisions().directory().get("myflow").is_some());
        ctl.on_workflow_event(WatchEvent::Deleted(flow));
        assert!(ctl.decisions().directory().get("myflow").is_none());
    }

    #[tokio::test]
    async fn stale_event_is_replaced_by_newer_store_copy() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_workflow(Workflow::with_steps(
            "default",
            vec![WorkflowStep::promote("staging", &[])],
        ));
        let stale = store.apply_activity(activity("act-1", "1"));
        let mut done = stale.clone();
        done.spec.workflow_status = ActivityStatus::Succeeded;
        store.apply_activity(done);

        let engine = Arc::new(RecordingEngine::default());
        let ctl = controller(store.clone(), engine.clone(), false);
        ctl.resync_workflows().await.unwrap();

        assert!(ctl.on_activity(stale).await.is_none());
        assert!(engine.environments().is_empty());
    }

    #[tokio::test]
    async fn superseded_builds_are_skipped_when_enabled() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_workflow(Workflow::with_steps(
            "default",
            vec![WorkflowStep::promote("staging", &[])],
        ));
        let engine = Arc::new(RecordingEngine::default());
        let ctl = controller(store.clone(), engine.clone(), true);
        ctl.resync_workflows().await.unwrap();

        assert!(ctl.evaluate(&activity("act-2", "2")).await.is_some());
        assert!(ctl.evaluate(&activity("act-1", "1")).await.is_none());
        assert!(ctl.evaluate(&activity("act-2", "2")).await.is_some());
        assert_eq!(engine.environments().len(), 2);
    }

    #[tokio::test]
    async fn superseded_builds_are_evaluated_by_default() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_workflow(Workflow::with_steps(
            "default",
            vec![WorkflowStep::promote("staging", &[])],
        ));
        let ctl = controller(store, Arc::new(RecordingEngine::default()), false);
        ctl.resync_workflows().await.unwrap();

        assert!(ctl.evaluate(&activity("act-2", "2")).await.is_some());
        assert!(ctl.evaluate(&activity("act-1", "1")).await.is_some());
    }

    #[tokio::test]
    async fn watch_mode_reacts_to_events() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_environment(Environment::new(
            "staging",
            EnvironmentSpec {
                namespace: "jx-staging".into(),
                promotion_strategy: PromotionStrategy::Manual,
                ..Default::default()
            },
        ));
        let engine = Arc::new(RecordingEngine::default());
        let ctl = Arc::new(controller(store.clone(), engine.clone(), false));
        let running = tokio::spawn(Arc::clone(&ctl).watch());

        // Let the initial listing finish and the watches subscribe.
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.apply_workflow(Workflow::with_steps(
            "myflow",
            vec![WorkflowStep::promote("staging", &[])],
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut a = activity("act-1", "1");
        a.spec.workflow = "myflow".into();
        store.apply_activity(a);

        for _ in 0..50 {
            if !engine.environments().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.environments(), vec!["staging"]);

        running.abort();
    }

    #[tokio::test]
    async fn watch_mode_resync_drops_workflows_whose_delete_was_missed() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.apply_workflow(Workflow::with_steps(
            "myflow",
            vec![WorkflowStep::promote("staging", &[])],
        ));
        let mut ctl = controller(store.clone(), Arc::new(RecordingEngine::default()), false);
        ctl.settings.resync_interval = Duration::from_millis(50);
        let ctl = Arc::new(ctl);
        let running = tokio::spawn(Arc::clone(&ctl).watch());

        for _ in 0..50 {
            if ctl.decisions().directory().get("myflow").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ctl.decisions().directory().get("myflow").is_some());

        assert!(store.forget_workflow("myflow").is_some());
        for _ in 0..100 {
            if ctl.decisions().directory().get("myflow").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ctl.decisions().directory().get("myflow").is_none());
        assert!(!running.is_finished());

        running.abort();
    }

    #[tokio::test]
    async fn watch_setup_failure_is_fatal() {
        let store = Arc::new(MemoryStore::new("jx"));
        store.set_unavailable(true);
        let ctl = Arc::new(controller(store, Arc::new(RecordingEngine::default()), false));
        assert!(ctl.watch().await.is_err());
    }
}

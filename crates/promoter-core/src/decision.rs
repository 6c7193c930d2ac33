//! Promotion decisions.
//!
//! Everything here is recomputed from a single activity snapshot plus the
//! current workflow: no state is carried between passes, so duplicate or
//! reordered watch events converge on the same answer.

use crate::bootstrap::WorkflowBootstrap;
use crate::crd::{PipelineActivity, PromoteActivityStep, Workflow, WorkflowStep};
use crate::directory::WorkflowDirectory;
use crate::policy::ReleaseBranchPolicy;
use crate::types::ActivityStatus;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A decision that `environment` should now receive a promotion for one
/// build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionIntent {
    pub application: String,
    pub environment: String,
    pub pipeline: String,
    pub build: String,
    pub version: String,
}

/// Why an activity produced no evaluation at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingData { fields: Vec<&'static str> },
    Terminated(ActivityStatus),
    NotReleaseBranch(String),
    WorkflowNotFound(String),
    BootstrapFailed { workflow: String, message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingData { fields } => {
                write!(f, "missing required data: {}", fields.join(", "))
            }
            SkipReason::Terminated(status) => write!(f, "workflow status is {status}"),
            SkipReason::NotReleaseBranch(branch) => {
                write!(f, "branch '{branch}' is not a release branch")
            }
            SkipReason::WorkflowNotFound(name) => write!(f, "workflow '{name}' not found"),
            SkipReason::BootstrapFailed { workflow, message } => {
                write!(f, "cannot create workflow '{workflow}': {message}")
            }
        }
    }
}

/// Result of walking a workflow against one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub workflow: String,
    /// Intents in workflow step order.
    pub intents: Vec<PromotionIntent>,
    /// Every promote step has a pull request and its promotion succeeded.
    pub all_steps_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Evaluate(Evaluation),
}

impl Decision {
    pub fn intents(&self) -> &[PromotionIntent] {
        match self {
            Decision::Evaluate(eval) => &eval.intents,
            Decision::Skip(_) => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Pure evaluation
// ---------------------------------------------------------------------------

/// Identifying data of an activity that passed the eligibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityKey {
    pub application: String,
    pub pipeline: String,
    pub build: String,
    pub version: String,
    pub branch: String,
}

/// Check the activity-level gates: required data, terminal status, and
/// release branch.
pub fn check_activity(
    activity: &PipelineActivity,
    policy: &ReleaseBranchPolicy,
) -> Result<ActivityKey, SkipReason> {
    let spec = &activity.spec;
    let application = activity.repository_name();

    let mut missing = Vec::new();
    if application.is_empty() {
        missing.push("gitRepository");
    }
    if spec.version.is_empty() {
        missing.push("version");
    }
    if spec.build.is_empty() {
        missing.push("build");
    }
    if spec.pipeline.is_empty() {
        missing.push("pipeline");
    }
    if !missing.is_empty() {
        return Err(SkipReason::MissingData { fields: missing });
    }

    if spec.workflow_status.is_terminated() {
        return Err(SkipReason::Terminated(spec.workflow_status.clone()));
    }

    let branch = activity.branch_name();
    if !policy.is_release_branch(&branch) {
        return Err(SkipReason::NotReleaseBranch(branch));
    }

    Ok(ActivityKey {
        application,
        pipeline: spec.pipeline.clone(),
        build: spec.build.clone(),
        version: spec.version.clone(),
        branch,
    })
}

/// Promote steps of an activity indexed by environment. A later step for the
/// same environment replaces an earlier one.
pub fn promote_status_map(activity: &PipelineActivity) -> HashMap<&str, &PromoteActivityStep> {
    activity
        .promote_steps()
        .filter(|step| !step.environment.is_empty())
        .map(|step| (step.environment.as_str(), step))
        .collect()
}

/// The first precondition environment that has not succeeded, with its
/// current status if it has one.
pub fn unmet_precondition<'a>(
    step: &'a WorkflowStep,
    statuses: &HashMap<&str, &PromoteActivityStep>,
) -> Option<(&'a str, Option<ActivityStatus>)> {
    step.preconditions.environments.iter().find_map(|env| {
        match statuses.get(env.as_str()) {
            None => Some((env.as_str(), None)),
            Some(s) if *s.status() != ActivityStatus::Succeeded => {
                Some((env.as_str(), Some(s.status().clone())))
            }
            Some(_) => None,
        }
    })
}

/// Walk `workflow` against `activity` and compute the promotion intents.
pub fn evaluate(activity: &PipelineActivity, key: &ActivityKey, workflow: &Workflow) -> Evaluation {
    let statuses = promote_status_map(activity);
    let mut intents = Vec::new();
    let mut all_steps_complete = true;

    for step in &workflow.spec.steps {
        let Some(env) = step.promote_environment() else {
            continue;
        };
        let status = statuses.get(env);

        if status.and_then(|s| s.pull_request_url()).is_none() {
            all_steps_complete = false;
            match unmet_precondition(step, &statuses) {
                Some((blocker, blocker_status)) => {
                    debug!(
                        activity = %activity.name_any(),
                        environment = %env,
                        precondition = %blocker,
                        status = ?blocker_status,
                        "precondition not met"
                    );
                }
                None => intents.push(PromotionIntent {
                    application: key.application.clone(),
                    environment: env.to_string(),
                    pipeline: key.pipeline.clone(),
                    build: key.build.clone(),
                    version: key.version.clone(),
                }),
            }
        }
        if status.is_some_and(|s| *s.status() != ActivityStatus::Succeeded) {
            all_steps_complete = false;
        }
    }

    Evaluation {
        workflow: workflow.name_any(),
        intents,
        all_steps_complete,
    }
}

// ---------------------------------------------------------------------------
// DecisionEngine
// ---------------------------------------------------------------------------

/// Resolves the workflow for an activity and evaluates it.
///
/// Safe to call concurrently: the only shared state is the directory, and
/// the default-workflow bootstrap is an explicit get-or-create.
pub struct DecisionEngine {
    directory: Arc<WorkflowDirectory>,
    policy: ReleaseBranchPolicy,
    bootstrap: Arc<dyn WorkflowBootstrap>,
    namespace: String,
    default_workflow: String,
}

impl DecisionEngine {
    pub fn new(
        directory: Arc<WorkflowDirectory>,
        policy: ReleaseBranchPolicy,
        bootstrap: Arc<dyn WorkflowBootstrap>,
        namespace: impl Into<String>,
        default_workflow: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            policy,
            bootstrap,
            namespace: namespace.into(),
            default_workflow: default_workflow.into(),
        }
    }

    pub fn directory(&self) -> &Arc<WorkflowDirectory> {
        &self.directory
    }

    pub async fn decide(&self, activity: &PipelineActivity) -> Decision {
        let key = match check_activity(activity, &self.policy) {
            Ok(key) => key,
            Err(reason) => return Decision::Skip(reason),
        };

        let name = activity.workflow_name(&self.default_workflow);
        match self.resolve_workflow(name).await {
            Ok(workflow) => Decision::Evaluate(evaluate(activity, &key, &workflow)),
            Err(reason) => Decision::Skip(reason),
        }
    }

    /// Look the workflow up in the directory, creating the default one on
    /// first reference.
    pub async fn resolve_workflow(&self, name: &str) -> Result<Arc<Workflow>, SkipReason> {
        if let Some(workflow) = self.directory.get(name) {
            return Ok(workflow);
        }
        if name != self.default_workflow {
            return Err(SkipReason::WorkflowNotFound(name.to_string()));
        }

        match self
            .bootstrap
            .create_default_workflow(&self.namespace, name)
            .await
        {
            Ok(workflow) => {
                info!(
                    workflow = %name,
                    namespace = %self.namespace,
                    steps = workflow.spec.steps.len(),
                    "created default workflow"
                );
                Ok(self.directory.insert_if_absent(workflow))
            }
            Err(e) => {
                warn!(workflow = %name, error = %e, "cannot create default workflow");
                Err(SkipReason::BootstrapFailed {
                    workflow: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

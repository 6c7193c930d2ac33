//! Custom resources read and written by the promotion controller.
//!
//! All three kinds live in the `jenkins.io/v1` API group:
//!
//! - [`Workflow`]: ordered promotion steps and their preconditions
//! - [`PipelineActivity`]: one build of one pipeline and its promotion history
//! - [`Environment`]: a promotion target and the namespace it deploys into

mod activity;
mod environment;
mod workflow;

pub use activity::{
    ActivityStep, CoreActivityStep, GitStatus, PipelineActivity, PipelineActivitySpec,
    PreviewActivityStep, PromoteActivityStep, PromotePullRequestStep, PromoteUpdateStep,
    RawActivityStep, StageActivityStep,
};
pub use environment::{Environment, EnvironmentRepository, EnvironmentSpec};
pub use workflow::{
    PromoteWorkflowStep, Workflow, WorkflowPreconditions, WorkflowSpec, WorkflowStep,
};

/// Returns true if `a` is a strictly newer resource version than `b`.
///
/// Resource versions are opaque strings to Kubernetes, but every store this
/// controller talks to issues them as increasing integers. Unparseable values
/// are never considered newer.
pub fn is_resource_version_newer(a: &str, b: &str) -> bool {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a > b,
        _ => false,
    }
}

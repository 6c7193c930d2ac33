use crate::types::ActivityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PipelineActivity records one build of one pipeline.
///
/// Written by the build pipeline and by the promotion engine. The controller
/// only reads it.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "PipelineActivity",
    plural = "pipelineactivities",
    shortname = "act",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Pipeline", "type":"string", "jsonPath":".spec.pipeline"}"#,
    printcolumn = r#"{"name":"Build", "type":"string", "jsonPath":".spec.build"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Workflow", "type":"string", "jsonPath":".spec.workflowStatus"}"#
)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineActivitySpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pipeline: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<RawActivityStep>")]
    pub steps: Vec<ActivityStep>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_logs_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_repository: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_owner: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_branch: String,
    #[serde(rename = "lastCommitSHA", skip_serializing_if = "String::is_empty")]
    pub last_commit_sha: String,
    /// Name of the workflow to drive this activity; empty means `default`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workflow: String,
    pub workflow_status: ActivityStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workflow_message: String,
}

// ---------------------------------------------------------------------------
// Activity steps
// ---------------------------------------------------------------------------

/// Fields shared by every kind of activity step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreActivityStep {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct StageActivityStep {
    #[serde(flatten)]
    pub core: CoreActivityStep,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<CoreActivityStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewActivityStep {
    #[serde(flatten)]
    pub core: CoreActivityStep,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub environment: String,
    #[serde(rename = "pullRequestURL", skip_serializing_if = "String::is_empty")]
    pub pull_request_url: String,
    #[serde(rename = "applicationURL", skip_serializing_if = "String::is_empty")]
    pub application_url: String,
}

/// Promotion of this build's version into one environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PromoteActivityStep {
    #[serde(flatten)]
    pub core: CoreActivityStep,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PromotePullRequestStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<PromoteUpdateStep>,
    #[serde(rename = "applicationURL", skip_serializing_if = "String::is_empty")]
    pub application_url: String,
}

impl PromoteActivityStep {
    /// The promotion pull request URL, if one has been raised.
    pub fn pull_request_url(&self) -> Option<&str> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.pull_request_url.as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn status(&self) -> &ActivityStatus {
        &self.core.status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotePullRequestStep {
    #[serde(flatten)]
    pub core: CoreActivityStep,
    #[serde(rename = "pullRequestURL", skip_serializing_if = "String::is_empty")]
    pub pull_request_url: String,
    #[serde(rename = "mergeCommitSHA", skip_serializing_if = "String::is_empty")]
    pub merge_commit_sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PromoteUpdateStep {
    #[serde(flatten)]
    pub core: CoreActivityStep,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<GitStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GitStatus {
    pub url: String,
    pub status: String,
}

/// One entry of `spec.steps`, dispatched on its `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawActivityStep", into = "RawActivityStep")]
pub enum ActivityStep {
    Stage(StageActivityStep),
    Promote(PromoteActivityStep),
    Preview(PreviewActivityStep),
    /// A kind this controller does not know about.
    Unknown(RawActivityStep),
}

/// Wire shape of an activity step: a `kind` discriminator plus one
/// populated payload field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RawActivityStep {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageActivityStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promote: Option<PromoteActivityStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewActivityStep>,
}

impl From<RawActivityStep> for ActivityStep {
    fn from(raw: RawActivityStep) -> Self {
        let step = match raw.kind.as_str() {
            "Stage" => raw.stage.clone().map(ActivityStep::Stage),
            "Promote" => raw.promote.clone().map(ActivityStep::Promote),
            "Preview" => raw.preview.clone().map(ActivityStep::Preview),
            // Older records omit the kind; fall back to whichever payload is set.
            "" => raw
                .promote
                .clone()
                .map(ActivityStep::Promote)
                .or_else(|| raw.stage.clone().map(ActivityStep::Stage))
                .or_else(|| raw.preview.clone().map(ActivityStep::Preview)),
            _ => None,
        };
        step.unwrap_or(ActivityStep::Unknown(raw))
    }
}

impl From<ActivityStep> for RawActivityStep {
    fn from(step: ActivityStep) -> Self {
        match step {
            ActivityStep::Stage(stage) => RawActivityStep {
                kind: "Stage".into(),
                stage: Some(stage),
                ..Default::default()
            },
            ActivityStep::Promote(promote) => RawActivityStep {
                kind: "Promote".into(),
                promote: Some(promote),
                ..Default::default()
            },
            ActivityStep::Preview(preview) => RawActivityStep {
                kind: "Preview".into(),
                preview: Some(preview),
                ..Default::default()
            },
            ActivityStep::Unknown(raw) => raw,
        }
    }
}

impl ActivityStep {
    pub fn as_promote(&self) -> Option<&PromoteActivityStep> {
        match self {
            ActivityStep::Promote(promote) => Some(promote),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived accessors
// ---------------------------------------------------------------------------

impl PipelineActivity {
    /// Explicit `gitRepository`, else the second-to-last segment of the
    /// pipeline name (`org/repo/branch` gives `repo`).
    pub fn repository_name(&self) -> String {
        if !self.spec.git_repository.is_empty() {
            return self.spec.git_repository.clone();
        }
        let paths: Vec<&str> = self.spec.pipeline.split('/').collect();
        if paths.len() > 1 {
            paths[paths.len() - 2].to_string()
        } else {
            String::new()
        }
    }

    /// Explicit `gitOwner`, else the first segment of the pipeline name.
    pub fn repository_owner(&self) -> String {
        if !self.spec.git_owner.is_empty() {
            return self.spec.git_owner.clone();
        }
        match self.spec.pipeline.split_once('/') {
            Some((owner, _)) => owner.to_string(),
            None => String::new(),
        }
    }

    /// Last `/`-delimited segment of the pipeline name.
    pub fn branch_name(&self) -> String {
        self.spec
            .pipeline
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Promote steps recorded so far, in the order they appear.
    pub fn promote_steps(&self) -> impl Iterator<Item = &PromoteActivityStep> {
        self.spec.steps.iter().filter_map(ActivityStep::as_promote)
    }

    /// Workflow to drive this activity, defaulting to `fallback` when unset.
    pub fn workflow_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.spec.workflow.is_empty() {
            fallback
        } else {
            &self.spec.workflow
        }
    }
}

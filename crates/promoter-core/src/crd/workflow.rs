use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Workflow declares which environments a pipeline's builds are promoted to.
///
/// Step order is only an iteration order: whether a step may fire is decided
/// by its preconditions, not its position.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "Workflow",
    plural = "workflows",
    shortname = "flow",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<WorkflowStep>,
}

/// One step of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Environments that must have succeeded before this step may fire.
    #[serde(default)]
    pub preconditions: WorkflowPreconditions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote: Option<PromoteWorkflowStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPreconditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoteWorkflowStep {
    pub environment: String,
}

impl WorkflowStep {
    /// A step promoting to `environment` once every environment in
    /// `after` has succeeded.
    pub fn promote(environment: impl Into<String>, after: &[&str]) -> Self {
        let environment = environment.into();
        Self {
            name: format!("promote-{environment}"),
            description: String::new(),
            preconditions: WorkflowPreconditions {
                environments: after.iter().map(|e| e.to_string()).collect(),
            },
            promote: Some(PromoteWorkflowStep { environment }),
        }
    }

    /// The environment this step promotes to, if it is a non-empty promote step.
    pub fn promote_environment(&self) -> Option<&str> {
        self.promote
            .as_ref()
            .map(|p| p.environment.as_str())
            .filter(|env| !env.is_empty())
    }
}

impl Workflow {
    pub fn with_steps(name: &str, steps: Vec<WorkflowStep>) -> Self {
        Workflow::new(name, WorkflowSpec { steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::ResourceExt;

    #[test]
    fn parses_workflow_yaml() {
        let yaml = r#"
apiVersion: jenkins.io/v1
kind: Workflow
metadata:
  name: myflow
spec:
  steps:
    - promote:
        environment: staging
    - preconditions:
        environments: [staging]
      promote:
        environment: production
"#;
        let flow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(flow.name_any(), "myflow");
        assert_eq!(flow.spec.steps.len(), 2);
        assert_eq!(flow.spec.steps[0].promote_environment(), Some("staging"));
        assert!(flow.spec.steps[0].preconditions.environments.is_empty());
        assert_eq!(
            flow.spec.steps[1].preconditions.environments,
            vec!["staging".to_string()]
        );
    }

    #[test]
    fn empty_promote_environment_is_not_a_promote_step() {
        let step = WorkflowStep {
            promote: Some(PromoteWorkflowStep {
                environment: String::new(),
            }),
            ..Default::default()
        };
        assert_eq!(step.promote_environment(), None);
        assert_eq!(WorkflowStep::default().promote_environment(), None);
    }

    #[test]
    fn promote_helper_sets_preconditions() {
        let step = WorkflowStep::promote("production", &["staging"]);
        assert_eq!(step.promote_environment(), Some("production"));
        assert_eq!(step.preconditions.environments, vec!["staging".to_string()]);
    }
}

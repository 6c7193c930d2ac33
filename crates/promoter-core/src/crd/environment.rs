use crate::types::{EnvironmentKind, PromotionStrategy};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment is a promotion target: a namespace plus the git repository
/// holding its desired state.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "Environment",
    plural = "environments",
    shortname = "env",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Namespace", "type":"string", "jsonPath":".spec.namespace"}"#,
    printcolumn = r#"{"name":"Kind", "type":"string", "jsonPath":".spec.kind"}"#,
    printcolumn = r#"{"name":"Promote", "type":"string", "jsonPath":".spec.promotionStrategy"}"#,
    printcolumn = r#"{"name":"Order", "type":"integer", "jsonPath":".spec.order"}"#
)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    pub promotion_strategy: PromotionStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EnvironmentRepository>,
    pub order: i32,
    pub kind: EnvironmentKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EnvironmentRepository {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "ref", skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
}

impl Environment {
    pub fn is_automatic(&self) -> bool {
        self.spec.promotion_strategy == PromotionStrategy::Automatic
    }

    pub fn is_permanent(&self) -> bool {
        self.spec.kind.is_permanent()
    }
}

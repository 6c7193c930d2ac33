use crate::crd::{Environment, Workflow, WorkflowStep};
use crate::error::Result;
use async_trait::async_trait;
use kube::ResourceExt;

/// Creates the built-in default workflow the first time an activity refers
/// to it.
///
/// Implementations must be idempotent: if the workflow already exists in the
/// store, return the stored copy instead of failing.
#[async_trait]
pub trait WorkflowBootstrap: Send + Sync {
    async fn create_default_workflow(&self, namespace: &str, name: &str) -> Result<Workflow>;
}

/// Build the default workflow from a namespace's environments.
///
/// Permanent environments with an `Auto` promotion strategy are chained in
/// `order` (ties broken by name): each one waits for the previous one to
/// succeed. No such environments gives an empty workflow.
pub fn default_workflow_from_environments(name: &str, environments: &[Environment]) -> Workflow {
    let mut auto: Vec<&Environment> = environments
        .iter()
        .filter(|env| env.is_permanent() && env.is_automatic())
        .collect();
    auto.sort_by(|a, b| {
        a.spec
            .order
            .cmp(&b.spec.order)
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });

    let mut steps = Vec::with_capacity(auto.len());
    let mut previous: Option<String> = None;
    for env in auto {
        let env_name = env.name_any();
        let after: Vec<&str> = previous.as_deref().into_iter().collect();
        steps.push(WorkflowStep::promote(env_name.as_str(), &after));
        previous = Some(env_name);
    }
    Workflow::with_steps(name, steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::EnvironmentSpec;
    use crate::types::{EnvironmentKind, PromotionStrategy};

    fn env(name: &str, order: i32, strategy: PromotionStrategy, kind: EnvironmentKind) -> Environment {
        Environment::new(
            name,
            EnvironmentSpec {
                namespace: format!("jx-{name}"),
                promotion_strategy: strategy,
                order,
                kind,
                ..Default::default()
            },
        )
    }

    #[test]
    fn chains_automatic_permanent_environments_in_order() {
        let envs = vec![
            env("production", 200, PromotionStrategy::Automatic, EnvironmentKind::Permanent),
            env("staging", 100, PromotionStrategy::Automatic, EnvironmentKind::Unset),
            env("dev", 0, PromotionStrategy::Never, EnvironmentKind::Development),
            env("pr-1", 50, PromotionStrategy::Automatic, EnvironmentKind::Preview),
            env("uat", 150, PromotionStrategy::Manual, EnvironmentKind::Permanent),
        ];
        let flow = default_workflow_from_environments("default", &envs);
        assert_eq!(flow.name_any(), "default");

        let targets: Vec<_> = flow
            .spec
            .steps
            .iter()
            .filter_map(|s| s.promote_environment())
            .collect();
        assert_eq!(targets, vec!["staging", "production"]);
        assert!(flow.spec.steps[0].preconditions.environments.is_empty());
        assert_eq!(
            flow.spec.steps[1].preconditions.environments,
            vec!["staging".to_string()]
        );
    }

    #[test]
    fn equal_order_sorts_by_name() {
        let envs = vec![
            env("b", 1, PromotionStrategy::Automatic, EnvironmentKind::Permanent),
            env("a", 1, PromotionStrategy::Automatic, EnvironmentKind::Permanent),
        ];
        let flow = default_workflow_from_environments("default", &envs);
        assert_eq!(flow.spec.steps[0].promote_environment(), Some("a"));
        assert_eq!(flow.spec.steps[1].promote_environment(), Some("b"));
    }

    #[test]
    fn no_automatic_environments_gives_empty_workflow() {
        let envs = vec![env("production", 1, PromotionStrategy::Manual, EnvironmentKind::Permanent)];
        let flow = default_workflow_from_environments("default", &envs);
        assert!(flow.spec.steps.is_empty());
    }
}

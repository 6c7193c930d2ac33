//! Resolution of the namespace a human-invoked promotion deploys into.

use crate::crd::Environment;
use crate::error::{PromoterError, Result};
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

/// Environment lookups and namespace provisioning for one team namespace.
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    async fn get_environment(&self, name: &str) -> Result<Option<Environment>>;

    async fn list_environments(&self) -> Result<Vec<Environment>>;

    /// Create the namespace unless it already exists.
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;
}

/// Where a promotion will land.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionTarget {
    pub namespace: String,
    /// The environment resource, when the target was named by environment.
    pub environment: Option<Environment>,
}

impl PromotionTarget {
    /// Automatic environments are normally promoted by the controller only,
    /// so a person promoting into one has to confirm first.
    pub fn requires_confirmation(&self) -> bool {
        self.environment
            .as_ref()
            .is_some_and(|env| env.is_automatic())
    }
}

/// Resolve the target namespace and make sure it exists.
///
/// An environment name wins over an explicit namespace; with neither,
/// `current_namespace` is used.
pub async fn resolve_target_namespace(
    api: &dyn EnvironmentApi,
    environment: Option<&str>,
    namespace: Option<&str>,
    current_namespace: &str,
) -> Result<PromotionTarget> {
    let target = match (environment.filter(|e| !e.is_empty()), namespace.filter(|n| !n.is_empty())) {
        (Some(name), _) => {
            let env = match api.get_environment(name).await? {
                Some(env) => env,
                None => return Err(unknown_environment(api, current_namespace, name).await?),
            };
            if env.spec.namespace.is_empty() {
                return Err(PromoterError::EnvironmentWithoutNamespace(name.to_string()));
            }
            PromotionTarget {
                namespace: env.spec.namespace.clone(),
                environment: Some(env),
            }
        }
        (None, Some(ns)) => PromotionTarget {
            namespace: ns.to_string(),
            environment: None,
        },
        (None, None) => PromotionTarget {
            namespace: current_namespace.to_string(),
            environment: None,
        },
    };

    debug!(namespace = %target.namespace, "ensuring target namespace exists");
    api.ensure_namespace(&target.namespace).await?;
    Ok(target)
}

/// Build the error for a missing environment, listing what does exist.
async fn unknown_environment(
    api: &dyn EnvironmentApi,
    team_namespace: &str,
    name: &str,
) -> Result<PromoterError> {
    let mut available: Vec<String> = api
        .list_environments()
        .await?
        .iter()
        .map(|env| env.name_any())
        .collect();
    if available.is_empty() {
        return Ok(PromoterError::NoEnvironments(team_namespace.to_string()));
    }
    available.sort();
    Ok(PromoterError::UnknownEnvironment {
        name: name.to_string(),
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::EnvironmentSpec;
    use crate::types::PromotionStrategy;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEnvironments {
        envs: Vec<Environment>,
        ensured: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EnvironmentApi for FakeEnvironments {
        async fn get_environment(&self, name: &str) -> Result<Option<Environment>> {
            Ok(self.envs.iter().find(|e| e.name_any() == name).cloned())
        }

        async fn list_environments(&self) -> Result<Vec<Environment>> {
            Ok(self.envs.clone())
        }

        async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
            self.ensured.lock().unwrap().push(namespace.to_string());
            Ok(())
        }
    }

    fn env(name: &str, namespace: &str, strategy: PromotionStrategy) -> Environment {
        Environment::new(
            name,
            EnvironmentSpec {
                namespace: namespace.into(),
                promotion_strategy: strategy,
                ..Default::default()
            },
        )
    }

    fn api() -> FakeEnvironments {
        FakeEnvironments {
            envs: vec![
                env("staging", "jx-staging", PromotionStrategy::Automatic),
                env("production", "jx-production", PromotionStrategy::Manual),
                env("broken", "", PromotionStrategy::Manual),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn environment_name_resolves_to_its_namespace() {
        let api = api();
        let target = resolve_target_namespace(&api, Some("production"), Some("ignored"), "jx")
            .await
            .unwrap();
        assert_eq!(target.namespace, "jx-production");
        assert!(!target.requires_confirmation());
        assert_eq!(*api.ensured.lock().unwrap(), vec!["jx-production".to_string()]);
    }

    #[tokio::test]
    async fn automatic_environment_requires_confirmation() {
        let target = resolve_target_namespace(&api(), Some("staging"), None, "jx")
            .await
            .unwrap();
        assert!(target.requires_confirmation());
    }

    #[tokio::test]
    async fn explicit_namespace_then_current_namespace() {
        let api = api();
        let target = resolve_target_namespace(&api, None, Some("custom"), "jx").await.unwrap();
        assert_eq!(target.namespace, "custom");
        assert!(!target.requires_confirmation());

        let target = resolve_target_namespace(&api, Some(""), None, "jx").await.unwrap();
        assert_eq!(target.namespace, "jx");
    }

    #[tokio::test]
    async fn environment_without_namespace_is_an_error() {
        let err = resolve_target_namespace(&api(), Some("broken"), None, "jx")
            .await
            .unwrap_err();
        assert!(matches!(err, PromoterError::EnvironmentWithoutNamespace(ref n) if n == "broken"));
    }

    #[tokio::test]
    async fn unknown_environment_lists_available() {
        let err = resolve_target_namespace(&api(), Some("qa"), None, "jx")
            .await
            .unwrap_err();
        match err {
            PromoterError::UnknownEnvironment { name, available } => {
                assert_eq!(name, "qa");
                assert_eq!(available, vec!["broken", "production", "staging"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn no_environments_at_all() {
        let api = FakeEnvironments::default();
        let err = resolve_target_namespace(&api, Some("staging"), None, "jx")
            .await
            .unwrap_err();
        assert!(matches!(err, PromoterError::NoEnvironments(ref ns) if ns == "jx"));
        assert!(api.ensured.lock().unwrap().is_empty());
    }
}

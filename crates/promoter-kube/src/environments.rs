use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use promoter_core::bootstrap::{default_workflow_from_environments, WorkflowBootstrap};
use promoter_core::crd::{Environment, Workflow};
use promoter_core::namespace::EnvironmentApi;
use promoter_core::{PromoterError, Result};
use tracing::{debug, info};

/// Environment lookups, namespace provisioning and the default-workflow
/// bootstrap for one team namespace.
#[derive(Clone)]
pub struct KubeEnvironments {
    client: Client,
    team_namespace: String,
}

impl KubeEnvironments {
    pub fn new(client: Client, team_namespace: &str) -> Self {
        Self {
            client,
            team_namespace: team_namespace.to_string(),
        }
    }

    fn environments(&self, namespace: &str) -> Api<Environment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

#[async_trait]
impl EnvironmentApi for KubeEnvironments {
    async fn get_environment(&self, name: &str) -> Result<Option<Environment>> {
        self.environments(&self.team_namespace)
            .get_opt(name)
            .await
            .map_err(|e| PromoterError::store(format!("get environment {name}"), e))
    }

    async fn list_environments(&self) -> Result<Vec<Environment>> {
        let list = self
            .environments(&self.team_namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| PromoterError::store("list environments", e))?;
        Ok(list.items)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let existing = namespaces
            .get_opt(namespace)
            .await
            .map_err(|e| PromoterError::store(format!("get namespace {namespace}"), e))?;
        if existing.is_some() {
            debug!(namespace = %namespace, "namespace already exists");
            return Ok(());
        }

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(namespace = %namespace, "created namespace");
                Ok(())
            }
            // Someone else created it between the get and the create.
            Err(e) if is_conflict(&e) => Ok(()),
            Err(e) => Err(PromoterError::store(format!("create namespace {namespace}"), e)),
        }
    }
}

#[async_trait]
impl WorkflowBootstrap for KubeEnvironments {
    async fn create_default_workflow(&self, namespace: &str, name: &str) -> Result<Workflow> {
        let bootstrap_err = |e: kube::Error| PromoterError::Bootstrap {
            namespace: namespace.to_string(),
            message: e.to_string(),
        };
        let workflows: Api<Workflow> = Api::namespaced(self.client.clone(), namespace);
        if let Some(existing) = workflows.get_opt(name).await.map_err(bootstrap_err)? {
            return Ok(existing);
        }

        let environments = self
            .environments(namespace)
            .list(&ListParams::default())
            .await
            .map_err(bootstrap_err)?;
        let workflow = default_workflow_from_environments(name, &environments.items);

        match workflows.create(&PostParams::default(), &workflow).await {
            Ok(created) => {
                info!(
                    namespace = %namespace,
                    workflow = %name,
                    steps = created.spec.steps.len(),
                    "created default workflow"
                );
                Ok(created)
            }
            Err(e) if is_conflict(&e) => workflows.get(name).await.map_err(bootstrap_err),
            Err(e) => Err(bootstrap_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "AlreadyExists".into(),
            code,
        })
    }

    #[test]
    fn conflict_is_detected_by_status_code() {
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(404)));
        assert!(!is_conflict(&api_error(500)));
    }
}

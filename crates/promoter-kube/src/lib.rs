//! Kubernetes plumbing for the promotion controller.

mod environments;
mod store;

pub use environments::KubeEnvironments;
pub use store::KubeStore;

use kube::Client;
use promoter_core::{PromoterError, Result};

/// Connect with the ambient kubeconfig or in-cluster credentials.
///
/// Returns the client and the namespace it defaults to.
pub async fn connect() -> Result<(Client, String)> {
    let client = Client::try_default()
        .await
        .map_err(|e| PromoterError::store("connect to cluster", e))?;
    let namespace = client.default_namespace().to_string();
    Ok((client, namespace))
}

use kube::CustomResourceExt;
use promoter_core::crd::{Environment, PipelineActivity, Workflow};

pub fn run() -> anyhow::Result<()> {
    let crds = [Workflow::crd(), PipelineActivity::crd(), Environment::crd()];
    let docs = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", docs.join("---\n"));
    Ok(())
}

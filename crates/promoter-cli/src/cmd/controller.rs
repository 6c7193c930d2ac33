use anyhow::Context;
use promoter_core::config::{Config, WarnLevel};
use promoter_core::controller::{ControllerSettings, WorkflowController};
use promoter_core::decision::DecisionEngine;
use promoter_core::directory::WorkflowDirectory;
use promoter_core::trigger::{PromotionTrigger, TriggerReport};
use promoter_engine::CommandEngine;
use promoter_kube::{KubeEnvironments, KubeStore};
use std::sync::Arc;

pub fn run(namespace: Option<String>, no_watch: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load config")?;
    check_config(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (client, current_namespace) = promoter_kube::connect()
            .await
            .context("failed to connect to Kubernetes")?;
        let namespace = namespace
            .or_else(|| config.namespace.clone())
            .unwrap_or(current_namespace);

        let store = Arc::new(KubeStore::new(client.clone(), &namespace));
        let environments = Arc::new(KubeEnvironments::new(client, &namespace));
        let policy = config.release_policy()?;
        tracing::info!(
            namespace = %namespace,
            release_branches = ?policy.patterns().collect::<Vec<_>>(),
            "starting promotion controller"
        );
        let decisions = DecisionEngine::new(
            Arc::new(WorkflowDirectory::new()),
            policy,
            environments,
            namespace.as_str(),
            config.default_workflow.as_str(),
        );
        let trigger = PromotionTrigger::new(Arc::new(CommandEngine::from_config(&config.promote)));
        let controller = WorkflowController::new(
            store,
            decisions,
            trigger,
            ControllerSettings {
                namespace: namespace.clone(),
                resync_interval: config.resync_interval(),
                skip_superseded_builds: config.skip_superseded_builds,
            },
        );

        if no_watch {
            let reports = controller
                .run_once()
                .await
                .with_context(|| format!("failed to process activities in {namespace}"))?;
            let succeeded: usize = reports.iter().map(TriggerReport::succeeded).sum();
            let failed: usize = reports.iter().map(|r| r.failed.len()).sum();
            tracing::info!(
                activities = reports.len(),
                succeeded,
                failed,
                "processed pipeline activities"
            );
            return Ok(());
        }

        Arc::new(controller)
            .watch()
            .await
            .with_context(|| format!("controller for namespace {namespace} stopped"))
    })
}

/// Log every config warning and refuse to start on errors.
fn check_config(config: &Config) -> anyhow::Result<()> {
    let warnings = config.validate();
    for w in &warnings {
        tracing::warn!(level = ?w.level, "{}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors; run `promoter config validate`");
    }
    Ok(())
}

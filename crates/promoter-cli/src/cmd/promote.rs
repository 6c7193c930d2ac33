use anyhow::Context;
use clap::Args;
use kube::ResourceExt;
use promoter_core::config::Config;
use promoter_core::namespace::resolve_target_namespace;
use promoter_core::trigger::{PromoteRequest, PromotionEngine};
use promoter_engine::CommandEngine;
use promoter_kube::KubeEnvironments;
use std::io::{self, BufRead, Write};

#[derive(Args)]
#[command(disable_version_flag = true)]
pub struct PromoteArgs {
    /// Environment to promote to
    #[arg(long = "env", short = 'e')]
    environment: Option<String>,

    /// Namespace to promote to when no environment is given
    #[arg(long, short = 'n')]
    namespace: Option<String>,

    /// Application to promote
    #[arg(long)]
    app: String,

    /// Version to promote
    #[arg(long)]
    version: String,

    /// Pipeline that produced the version (e.g. org/repo/master)
    #[arg(long, default_value = "")]
    pipeline: String,

    /// Build number of the pipeline run
    #[arg(long, default_value = "")]
    build: String,

    /// Never prompt for confirmation
    #[arg(long)]
    batch_mode: bool,
}

pub fn run(args: PromoteArgs) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load config")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (client, current_namespace) = promoter_kube::connect()
            .await
            .context("failed to connect to Kubernetes")?;
        let team_namespace = config.namespace.clone().unwrap_or(current_namespace);
        let environments = KubeEnvironments::new(client, &team_namespace);

        let target = resolve_target_namespace(
            &environments,
            args.environment.as_deref(),
            args.namespace.as_deref(),
            &team_namespace,
        )
        .await?;

        if target.requires_confirmation() && !args.batch_mode {
            let env_name = target
                .environment
                .as_ref()
                .map(|env| env.name_any())
                .unwrap_or_default();
            let question = format!(
                "Environment {env_name} is promoted automatically by the pipeline. \
                 Do you wish to promote anyway? [y/N] "
            );
            let stdin = io::stdin();
            if !confirm(&question, stdin.lock(), io::stdout())? {
                println!("Promotion cancelled.");
                return Ok(());
            }
        }

        let environment = target
            .environment
            .as_ref()
            .map(|env| env.name_any())
            .unwrap_or_default();
        let request = PromoteRequest {
            application: args.app,
            namespace: environment.is_empty().then(|| target.namespace.clone()),
            environment,
            pipeline: args.pipeline,
            build: args.build,
            version: args.version,
            batch_mode: true,
            ignore_local_files: true,
        };

        let engine = CommandEngine::from_config(&config.promote);
        engine
            .promote(&request)
            .await
            .with_context(|| format!("failed to promote into namespace {}", target.namespace))?;
        println!(
            "Promoted {} {} to {}",
            request.application, request.version, target.namespace
        );
        Ok(())
    })
}

/// Ask a yes/no question; anything but `y` or `yes` is a no.
fn confirm(question: &str, mut input: impl BufRead, mut output: impl Write) -> io::Result<bool> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_accepts_yes() {
        let mut out = Vec::new();
        assert!(confirm("go? ", "y\n".as_bytes(), &mut out).unwrap());
        assert!(confirm("go? ", "YES\n".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("go? "));
    }

    #[test]
    fn confirm_defaults_to_no() {
        let mut out = Vec::new();
        assert!(!confirm("go? ", "\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm("go? ", "nope\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm("go? ", "".as_bytes(), &mut out).unwrap());
    }
}

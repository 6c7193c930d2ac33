mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;

#[derive(Parser)]
#[command(
    name = "promoter",
    about = "Promotion workflow controller: promotes pipeline builds through environments",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch PipelineActivity and Workflow resources and trigger promotions
    Controller {
        /// Namespace to watch (default: the current namespace)
        #[arg(long, short = 'n')]
        namespace: Option<String>,

        /// Process every activity once and exit instead of watching
        #[arg(long)]
        no_watch: bool,
    },

    /// Promote an application version into an environment
    Promote(cmd::promote::PromoteArgs),

    /// Print the CustomResourceDefinitions as YAML
    Crds,

    /// Show or validate the controller configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Controller { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Controller {
            namespace,
            no_watch,
        } => cmd::controller::run(namespace, no_watch),
        Commands::Promote(args) => cmd::promote::run(args),
        Commands::Crds => cmd::crds::run(),
        Commands::Config { subcommand } => cmd::config::run(subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

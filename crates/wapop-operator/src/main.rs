mod controller;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kube::CustomResourceExt;
use tracing_subscriber::EnvFilter;
use wapop_core::{AccessPoint, OperatorConfig};

#[derive(Parser, Debug)]
#[command(name = "wapop", version, about = "Wireless access point operator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node controller (default)
    Run,
    /// Print the AccessPoint CustomResourceDefinition as YAML
    Crd,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Home namespace; defaults to the service account namespace (env: WAPOP_NAMESPACE)
    #[arg(long, global = true, env = "WAPOP_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the settings ConfigMap and Secret (env: WAPOP_SETTINGS)
    #[arg(long, global = true, env = "WAPOP_SETTINGS", default_value = wapop_core::SETTINGS_NAME)]
    settings: String,

    /// Name of the ConfigMap holding the enable/disable scripts (env: WAPOP_SCRIPTS)
    #[arg(long, global = true, env = "WAPOP_SCRIPTS")]
    scripts: Option<String>,

    /// Container image running the scripts (env: WAPOP_IMAGE)
    #[arg(long, global = true, env = "WAPOP_IMAGE")]
    image: Option<String>,

    /// Upper bound on a single reconciliation pass, in seconds
    #[arg(long, global = true, env = "WAPOP_PASS_TIMEOUT_SECS", default_value_t = 30)]
    pass_timeout_secs: u64,
}

impl RunArgs {
    fn into_config(self) -> Result<OperatorConfig> {
        let mut config = OperatorConfig::resolve(self.namespace)
            .context("resolving operator namespace")?;
        config.settings_name = self.settings;
        if let Some(scripts) = self.scripts {
            config.scripts_config_map = scripts;
        }
        if let Some(image) = self.image {
            config.image = image;
        }
        config.pass_timeout = Duration::from_secs(self.pass_timeout_secs);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Crd => {
            print!("{}", serde_yaml::to_string(&AccessPoint::crd())?);
            Ok(())
        }
        Command::Run => {
            setup_logging();
            let config = cli.run.into_config()?;
            tracing::info!(namespace = %config.namespace, settings = %config.settings_name, "starting wapop operator");
            let client = kube::Client::try_default()
                .await
                .context("connecting to the kubernetes api")?;
            controller::run(client, config).await
        }
    }
}

/// Set up tracing subscriber, `RUST_LOG` overrides the `info` default.
fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}

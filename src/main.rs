//! # infractl
//!
//! Operator CLI for service documents and the releases they produce.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infra_provisioner::cli;
use infra_provisioner::provider::helm::HelmChartProvisioner;
use infra_provisioner::provider::kubernetes::KubeSecretStore;
use infra_provisioner::ProvisionerConfig;
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Infra Provisioner CLI
#[derive(Parser)]
#[command(name = "infractl")]
#[command(
    about = "Validate, inspect and render service documents",
    long_about = None,
    after_help = "\
Examples:
  infractl validate services.yaml
  infractl secrets services.yaml
  infractl render services.yaml --namespace shop --secret db_password=hunter2
  infractl apply services.yaml --namespace shop --secret db_password=hunter2
  infractl status postgresql --namespace shop
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a service document
    Validate {
        /// Path to the service document
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List the secret names a document references
    Secrets {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print resolved service values and app env as JSON
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target namespace (defaults to DEFAULT_NAMESPACE)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Secret value, may be repeated
        #[arg(long = "secret", value_name = "NAME=VALUE", value_parser = parse_secret)]
        secrets: Vec<(String, String)>,

        /// Print secret values instead of masking them
        #[arg(long)]
        reveal: bool,
    },
    /// Provision every service of a document into the current cluster
    Apply {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long)]
        namespace: Option<String>,

        #[arg(long = "secret", value_name = "NAME=VALUE", value_parser = parse_secret)]
        secrets: Vec<(String, String)>,
    },
    /// Show the live status of a release
    Status {
        /// Release name
        #[arg(value_name = "RELEASE")]
        release: String,

        #[arg(short, long)]
        namespace: Option<String>,
    },
}

fn parse_secret(raw: &str) -> Result<(String, String), String> {
    cli::parse_key_value(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any rustls use
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    let config = ProvisionerConfig::from_env();
    init_tracing(&config);
    debug!("Configuration: {:?}", config);

    let cli = Cli::parse();
    let output = match cli.command {
        Commands::Validate { file } => cli::validate_command(&file)?,
        Commands::Secrets { file } => cli::secrets_command(&file)?,
        Commands::Render {
            file,
            namespace,
            secrets,
            reveal,
        } => {
            let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());
            cli::render_command(&file, &namespace, &cli::secret_map(secrets), reveal)?
        }
        Commands::Apply {
            file,
            namespace,
            secrets,
        } => {
            let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());
            let client = Client::try_default()
                .await
                .context("Failed to create Kubernetes client")?;
            let charts = Arc::new(HelmChartProvisioner::from_config(&config));
            let secret_store = Arc::new(KubeSecretStore::new(client, &config.field_manager));
            cli::apply_command(
                &file,
                &namespace,
                cli::secret_map(secrets),
                charts,
                secret_store,
                &config,
            )
            .await?
        }
        Commands::Status { release, namespace } => {
            let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());
            let helm = HelmChartProvisioner::from_config(&config);
            let status = cli::status_command(&helm, &release, &namespace)
                .await
                .context("Status query failed")?;
            format!("{namespace}/{release}: {status}")
        }
    };

    println!("{output}");
    Ok(())
}

fn init_tracing(config: &ProvisionerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("infra_provisioner={}", config.log_level.to_lowercase()).into());

    // Logs go to stderr so command output stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json_logs() {
        builder.json().init();
    } else {
        builder.init();
    }
}

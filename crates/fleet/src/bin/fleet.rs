//! Fleet CLI - provision Airflow deployments and publish their images.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleet::config::{ProvisionerConfig, PublisherConfig};
use fleet::houston::{ExecutorKind, HoustonClient};
use fleet::image::DockerCli;
use fleet::ledger::{find_unpublished, Ledger, DEFAULT_LEDGER_FILE};
use fleet::provision::{self, FailurePolicy, ProvisionPlan};
use fleet::publish::{self, PublishOptions};

/// Fleet CLI - batch provisioning for Houston-managed Airflow.
#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Provision Airflow deployments and publish their images")]
struct Cli {
    /// Path to the ledger file shared by provision and publish.
    #[arg(long, env = "FLEET_LEDGER", default_value = DEFAULT_LEDGER_FILE, global = true)]
    ledger: PathBuf,

    /// Platform base domain, e.g. example.com (or set `SERVER_URL` env var).
    #[arg(long, env = "SERVER_URL", global = true)]
    server_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every deployment in the batch that the ledger does not list yet.
    Provision {
        /// API token (or set `TOKEN` env var).
        #[arg(long, env = "TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Workspace UUID (or set `WORKSPACE_ID` env var).
        #[arg(long, env = "WORKSPACE_ID")]
        workspace_id: Option<String>,

        /// Number of deployments in the batch.
        #[arg(long, default_value = "32")]
        count: u32,

        /// Label prefix; labels are <prefix>-000, <prefix>-001, ...
        #[arg(long, default_value = "Deployment")]
        label_prefix: String,

        /// Executors to choose from at random (comma-separated).
        #[arg(long, value_delimiter = ',', default_values = ["KubernetesExecutor", "CeleryExecutor"])]
        executors: Vec<ExecutorKind>,

        /// Airflow version.
        #[arg(long, default_value = "2.4.3")]
        airflow_version: String,

        /// Deployment description.
        #[arg(long, default_value = "CreateApi_k8s_image_01")]
        description: String,

        /// Seconds to wait after each creation before the next one.
        #[arg(long, default_value = "60")]
        settle_secs: u64,

        /// Skip labels that fail instead of aborting the run.
        #[arg(long, default_value = "false")]
        keep_going: bool,
    },

    /// Build and push an image for every deployment not yet published under the tag.
    Publish {
        /// Build context directory.
        #[arg(long, default_value = "./qa-scenario-dags")]
        context: PathBuf,

        /// Publish tag (image tag and ledger completion marker).
        #[arg(long, default_value = "deploy-1")]
        tag: String,

        /// Value of the `platform` build argument.
        #[arg(long, default_value = "linux/amd64")]
        platform: String,

        /// Additional build arguments (KEY=VALUE, repeatable).
        #[arg(long = "build-arg", value_parser = parse_key_val)]
        build_args: Vec<(String, String)>,

        /// Container engine binary.
        #[arg(long, default_value = "docker")]
        docker: String,
    },

    /// Show the ledger and how many records still need publishing.
    Status {
        /// Publish tag to check against.
        #[arg(long, default_value = "deploy-1")]
        tag: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load `.env` from the working directory; a missing file is fine.
fn load_env_file() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("Invalid .env file"),
    }
}

/// Cancel the returned token on the first Ctrl-C or SIGTERM. A second
/// Ctrl-C exits immediately.
fn cancel_on_shutdown_signal() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupted, stopping after the current deployment (Ctrl-C again to exit now)");
        cancel_on_signal.cancel();

        if signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    cancel
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<()> {
    load_env_file()?;
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ledger = Ledger::new(&cli.ledger);

    match cli.command {
        Commands::Provision {
            token,
            workspace_id,
            count,
            label_prefix,
            executors,
            airflow_version,
            description,
            settle_secs,
            keep_going,
        } => {
            let config = ProvisionerConfig::new(cli.server_url, token, workspace_id)
                .context("Invalid provisioner configuration")?;
            let client =
                HoustonClient::new(&config).context("Failed to create Houston client")?;

            let plan = ProvisionPlan {
                count,
                label_prefix,
                executors,
                airflow_version,
                description,
                settle: Duration::from_secs(settle_secs),
                on_failure: if keep_going {
                    FailurePolicy::Continue
                } else {
                    FailurePolicy::Abort
                },
            };

            info!(count, endpoint = %client.endpoint(), "Provisioning deployments");
            let cancel = cancel_on_shutdown_signal();
            let report = provision::run(&client, &ledger, &plan, &cancel)
                .await
                .context("Error in creating deployment")?;

            println!("\nProvisioning summary:");
            println!("  Created: {}", report.created.len());
            println!("  Skipped: {}", report.skipped.len());
            println!("  Failed:  {}", report.failed.len());
            for (label, reason) in &report.failed {
                println!("    {label}: {reason}");
            }
            if report.cancelled {
                println!("  Interrupted before the batch finished.");
            }

            if !report.failed.is_empty() {
                bail!("{} deployment(s) could not be created", report.failed.len());
            }
        }

        Commands::Publish {
            context,
            tag,
            platform,
            build_args,
            docker,
        } => {
            let config = PublisherConfig::new(cli.server_url)
                .context("Invalid publisher configuration")?;
            let engine = DockerCli::with_program(docker);

            let mut args = vec![("platform".to_string(), platform)];
            args.extend(build_args);
            let options = PublishOptions {
                context,
                tag,
                build_args: args,
            };

            info!(tag = %options.tag, registry = %config.server.registry_host(), "Publishing images");
            let report = publish::run(&config, &engine, &ledger, &options)
                .await
                .context("Failed to publish images")?;

            println!("\nPublishing summary:");
            println!("  Pushed:            {}", report.published.len());
            for image in &report.published {
                println!("    {image}");
            }
            println!("  Already published: {}", report.already_published);
            println!("  Skipped:           {}", report.skipped.len());
        }

        Commands::Status { tag } => {
            let records = ledger.load()?;
            println!(
                "\n{:<18} {:<28} {:<28} {:<20} {:<8} {:<10}",
                "LABEL", "ID", "RELEASE", "EXECUTOR", "AIRFLOW", "TAG"
            );
            println!("{}", "-".repeat(117));
            for record in &records {
                println!(
                    "{:<18} {:<28} {:<28} {:<20} {:<8} {:<10}",
                    record.label,
                    record.id,
                    record.release_name,
                    record.executor,
                    record.airflow_version,
                    record.tag.as_deref().unwrap_or("-")
                );
            }
            let pending = find_unpublished(&records, &tag).len();
            println!("\n{} record(s), {pending} not yet published as '{tag}'", records.len());
        }
    }

    Ok(())
}

//! policy-control binary
//!
//! Configuration sources:
//!   --config / POLICY_CONTROL_CONFIG  YAML file (optional)
//!   POLICY_CONTROL_WEBHOOK_ADDR       webhook listen address override
//!   POLICY_CONTROL_NOT_APPLICABLE     halt_chain | skip_policy
//!   RUST_LOG                          log filter (default: info,policy_control=debug)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use k8s_openapi::api::networking::v1::Ingress;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use policy_control::config::{Config, ENV_CONFIG_PATH};
use policy_control::controller::{self, ControllerContext};
use policy_control::store::{KubeStore, MemoryStore, ObjectStore};
use policy_control::{build_dispatcher, gatus, webhook, Reconciler};

#[derive(Parser)]
#[command(name = "policy-control", version, about = "Cluster mutation policy controller")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, global = true, env = ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingress controller and/or the pod admission webhook
    Run,
    /// List registered policies in execution order
    Policies,
    /// Print the Gatus config that would be generated for an ingress manifest
    Render {
        /// Ingress manifest (YAML or JSON)
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,policy_control=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            Config::from_file(path)?
        }
        None => Config::default(),
    }
    .with_env_overrides()?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Policies => list_policies(&config),
        Command::Render { file } => render(&config, &file),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let kube_store = KubeStore::try_default()
        .await
        .context("failed to build kubernetes client")?;
    let client = kube_store.client();
    let store: Arc<dyn ObjectStore> = Arc::new(kube_store);
    let dispatcher = Arc::new(build_dispatcher(&config, Arc::clone(&store))?);

    tracing::info!(
        policies = dispatcher.registry().len(),
        not_applicable = ?config.dispatch.not_applicable,
        "policy registry sealed"
    );

    let mut tasks = tokio::task::JoinSet::new();

    if config.webhook.enabled {
        let listener = TcpListener::bind(&config.webhook.bind_addr)
            .await
            .with_context(|| format!("failed to bind to {}", config.webhook.bind_addr))?;
        tracing::info!(addr = %config.webhook.bind_addr, "admission webhook listening");
        let app = webhook::router(Arc::clone(&dispatcher));
        tasks.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await
                .context("webhook server error")
        });
    }

    if config.controller.enabled {
        let ctx = Arc::new(ControllerContext {
            reconciler: Reconciler::new(store, Arc::clone(&dispatcher)),
            requeue_after: Duration::from_secs(config.controller.requeue_after_secs),
        });
        tasks.spawn(async move {
            controller::run(client, ctx).await;
            Ok(())
        });
    }

    if tasks.is_empty() {
        tracing::warn!("controller and webhook both disabled, nothing to run");
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }
    Ok(())
}

fn list_policies(config: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(config, store)?;
    for (index, policy) in dispatcher.registry().all_policies().iter().enumerate() {
        println!("{:>2}. {:<24} {}", index + 1, policy.name(), policy.resource_type());
    }
    Ok(())
}

fn render(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let ingress: Ingress = serde_yaml::from_str(&content)
        .with_context(|| format!("{} is not an ingress manifest", file.display()))?;
    let document = gatus::render(&ingress, &config.policies.ingress_gatus.dns_resolver)?;
    print!("{document}");
    Ok(())
}

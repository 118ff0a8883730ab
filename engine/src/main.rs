//! Azure Discover - Standalone Binary
//!
//! Builds an asset inventory of the Azure subscriptions reachable with an ARM
//! access token (or from a fixture file) and prints it as JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use azure_inventory::discovery::config::{
    OPTION_CLIENT_ID, OPTION_SUBSCRIPTIONS, OPTION_SUBSCRIPTIONS_EXCLUDE, OPTION_TENANT_ID,
};
use azure_inventory::discovery::{ClientFactory, PartialFailurePolicy, ScopeLister};
use azure_inventory::{ArmClient, Config, DiscoverySettings, InventoryAggregator, MockCloud};

/// Azure Discover - enumerate subscriptions and resources into an inventory
#[derive(Parser, Debug)]
#[command(name = "azure-discover", version, about)]
struct Args {
    /// Discovery targets (comma separated; `auto`, `all` or target names)
    #[arg(long, value_delimiter = ',', default_value = "auto", env = "AZURE_DISCOVERY_TARGETS")]
    targets: Vec<String>,

    /// Only these subscriptions (comma separated ids)
    #[arg(long)]
    subscriptions: Option<String>,

    /// Skip these subscriptions (ignored when --subscriptions is set)
    #[arg(long)]
    subscriptions_exclude: Option<String>,

    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: Option<String>,

    /// ARM bearer token
    #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Serve data from a JSON fixture instead of calling ARM
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Maximum (target, subscription) tasks in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-discoverer timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep going after a failed task and report partial results
    #[arg(long, default_value = "false")]
    collect_errors: bool,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn root_config(args: &Args) -> Config {
    let mut config = Config::azure().with_targets(args.targets.iter().cloned());

    let options = [
        (OPTION_SUBSCRIPTIONS, &args.subscriptions),
        (OPTION_SUBSCRIPTIONS_EXCLUDE, &args.subscriptions_exclude),
        (OPTION_TENANT_ID, &args.tenant_id),
        (OPTION_CLIENT_ID, &args.client_id),
    ];
    for (key, value) in options {
        if let Some(value) = value {
            config = config.option(key, value.as_str());
        }
    }

    config
}

fn settings(args: &Args) -> Result<DiscoverySettings> {
    let mut settings = DiscoverySettings::from_env()?;

    if let Some(concurrency) = args.concurrency {
        settings = settings.concurrency(concurrency);
    }
    if let Some(secs) = args.timeout_secs {
        settings = settings.timeout(Duration::from_secs(secs));
    }
    if args.collect_errors {
        settings = settings.failure_policy(PartialFailurePolicy::CollectErrors);
    }

    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let root = root_config(&args);
    let settings = settings(&args)?;

    info!(
        targets = ?args.targets,
        concurrency = settings.concurrency,
        policy = ?settings.failure_policy,
        "Starting Azure discovery"
    );

    let (scopes, clients): (Arc<dyn ScopeLister>, Arc<dyn ClientFactory>) =
        match (&args.fixture, &args.access_token) {
            (Some(path), _) => {
                info!(fixture = %path.display(), "Using fixture data");
                let cloud = Arc::new(MockCloud::from_fixture(path)?);
                let scopes: Arc<dyn ScopeLister> = cloud.clone();
                let clients: Arc<dyn ClientFactory> = cloud;
                (scopes, clients)
            }
            (None, Some(token)) => {
                let arm = Arc::new(ArmClient::new(token)?);
                let scopes: Arc<dyn ScopeLister> = arm.clone();
                let clients: Arc<dyn ClientFactory> = arm;
                (scopes, clients)
            }
            (None, None) => bail!("Either --access-token (AZURE_ACCESS_TOKEN) or --fixture is required"),
        };

    let report = InventoryAggregator::new(scopes, clients, root)
        .with_settings(settings)
        .run()
        .await
        .context("Discovery failed")?;

    for err in &report.errors {
        warn!(error = %err, "Partial discovery failure");
    }
    for target in &report.skipped_targets {
        warn!(target_name = %target, "Skipped unknown discovery target");
    }

    info!(
        assets = report.inventory.len(),
        dropped_tag_values = report.dropped_tag_values,
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Discovery finished"
    );

    let json = serde_json::to_string_pretty(&report.inventory)
        .context("Failed to serialize inventory")?;
    println!("{}", json);

    Ok(())
}

//! hoover-bdd: runs the cleaning-sessions features against the hoover service.
//!
//! One invocation is one test worker. Parallel runs start several processes
//! with distinct `--worker-id` values; each gets its own server port, debug
//! port and readiness file.

mod client;
mod session;
mod steps;
mod world;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use cucumber::{World, cli, writer::Stats as _};
use futures::FutureExt;
use hoover_common::logging::{LoggingOptions, init_logging};
use hoover_common::util::clean_dir;
use hoover_common::{HarnessConfig, ServerLifecycle, WorkerId};
use tracing::{error, info};

use crate::client::CleaningClient;
use crate::session::WorkerSession;
use crate::world::HooverWorld;

/// Harness options, accepted alongside cucumber's own flags.
#[derive(Debug, Args)]
struct HarnessOpts {
    /// Feature file or directory of feature files
    #[arg(long, default_value = "features")]
    features: PathBuf,

    /// Worker identity; derives the server port, debug port and log file
    #[arg(long, env = "HOOVER_WORKER_ID")]
    worker_id: Option<u32>,

    /// Test output directory, emptied before the run
    #[arg(long, default_value = "test_output/output")]
    output_dir: PathBuf,

    /// Debug-level harness logging when RUST_LOG is unset
    #[arg(long)]
    debug_logs: bool,

    /// Emit harness logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = cli::Opts::<_, _, _, HarnessOpts>::parsed();
    let harness = &opts.custom;

    init_logging(LoggingOptions {
        verbose: harness.debug_logs,
        json: harness.json_logs,
    })?;

    let output_dir = clean_dir(&harness.output_dir)
        .with_context(|| format!("Failed to clean {}", harness.output_dir.display()))?;

    let mut config = HarnessConfig::from_env().map_err(|errors| {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow!("Invalid harness configuration:\n  {}", details.join("\n  "))
    })?;
    if let Some(id) = harness.worker_id {
        config = config.with_worker(WorkerId::new(id));
    }

    let lifecycle = ServerLifecycle::new(config)?;
    let client = CleaningClient::new(lifecycle.base_uri())?;
    info!(
        worker = %lifecycle.context().worker(),
        management = %lifecycle.config().management,
        endpoint = client.base_uri(),
        readiness_file = %lifecycle.readiness_target(),
        output_dir = %output_dir.display(),
        "Starting hoover BDD worker"
    );
    let session = session::install(WorkerSession::new(lifecycle, client))?;

    let features = harness.features.clone();
    let writer = HooverWorld::cucumber()
        .max_concurrent_scenarios(1)
        .before(|_, _, _, world| {
            async move {
                world.reset_exchange().await;
            }
            .boxed_local()
        })
        .with_cli(opts)
        .run(features)
        .await;

    let teardown = session.teardown().await;
    if let Err(e) = &teardown {
        error!(error = %e, "Suite teardown failed");
    }

    if writer.execution_has_failed() {
        bail!(
            "{} step(s) failed, {} parsing error(s), {} hook error(s)",
            writer.failed_steps(),
            writer.parsing_errors(),
            writer.hook_errors()
        );
    }
    teardown.context("Suite teardown failed")
}

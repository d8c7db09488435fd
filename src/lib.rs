// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod launcher;
pub mod logging;
pub mod registry;
pub mod store;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::config::model::ConfigFile;
use crate::store::{FileSnapshotStore, SnapshotStore};

pub use crate::errors::BotkeeperError;
pub use crate::supervisor::{BotDetails, ShutdownReport, Supervisor};
pub use crate::types::{BotId, BotStatus, BotSummary, Deployed, OwnerId, parse_bot_id};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - recovery of previously deployed bots
/// - optional startup deployments (`--deploy-dir`, `--repo`)
/// - the crash monitor
/// - SIGINT / SIGTERM handling and graceful shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let supervisor = Supervisor::from_config(cfg).await?;
    let recovery = supervisor.recovery_report();
    info!(
        restored = recovery.restored,
        failed = recovery.failed,
        skipped = recovery.skipped,
        "supervisor ready"
    );

    if let Some(owner) = args.owner {
        deploy_at_startup(&supervisor, owner, &args).await;
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = supervisor.spawn_monitor(stop_rx);

    wait_for_shutdown_signal().await;
    info!("shutdown requested");

    let _ = stop_tx.send(true);
    if let Err(e) = monitor.await {
        warn!(error = %e, "crash monitor task ended abnormally");
    }

    let report = supervisor.shutdown().await;
    if report.leaked > 0 {
        error!(leaked = report.leaked, "some children could not be terminated");
    }
    if !report.snapshot_saved {
        anyhow::bail!("final snapshot could not be saved");
    }
    Ok(())
}

/// Startup deployments are best-effort: failures are logged, the supervisor
/// keeps running.
async fn deploy_at_startup(supervisor: &Arc<Supervisor>, owner: OwnerId, args: &CliArgs) {
    if let Some(dir) = &args.deploy_dir {
        match supervisor.deploy_from_directory(owner, dir).await {
            Ok(count) => info!(dir = ?dir, count, "startup directory deployment done"),
            Err(e) => error!(dir = ?dir, error = %e, "startup directory deployment failed"),
        }
    }
    if let Some(url) = &args.repo {
        match supervisor.deploy_from_repository(owner, url).await {
            Ok(count) => info!(url = %url, count, "startup repository deployment done"),
            Err(e) => error!(url = %url, error = %e, "startup repository deployment failed"),
        }
    }
}

/// Wait for Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!(error = %e, "failed to listen for Ctrl+C");
                        }
                    }
                    _ = sigterm.recv() => debug!("received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot install SIGTERM handler; only Ctrl+C will stop"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
    }
}

/// Simple dry-run output: print settings and what recovery would relaunch.
fn print_dry_run(cfg: &ConfigFile) {
    println!("botkeeper dry-run");
    println!("  supervisor.work_dir = {:?}", cfg.supervisor.work_dir);
    println!("  supervisor.snapshot_file = {:?}", cfg.supervisor.snapshot_file);
    println!("  supervisor.restart_policy = {:?}", cfg.supervisor.restart_policy);
    println!(
        "  launcher = {} {:?} <file>.{}",
        cfg.launcher.interpreter, cfg.launcher.args, cfg.launcher.extension
    );
    println!(
        "  launcher.stop_timeout = {:?}, kill_timeout = {:?}",
        cfg.launcher.stop_timeout, cfg.launcher.kill_timeout
    );
    println!();

    let store = FileSnapshotStore::new(&cfg.supervisor.snapshot_file);
    match store.load() {
        None => println!("snapshot: none"),
        Some(snapshot) => {
            println!("snapshot (next_id = {}):", snapshot.next_id);
            for (id, bot) in snapshot.entries() {
                let state = if bot.file.is_file() { "recoverable" } else { "missing file" };
                println!("  - {id}: {} (owner {}) {:?} [{state}]", bot.name, bot.user_id, bot.file);
            }
        }
    }

    debug!("dry-run complete (nothing launched)");
}

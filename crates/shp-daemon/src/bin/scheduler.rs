// SPDX-License-Identifier: MIT

//! Entrypoint for the C5 Scheduler process: one logical writer draining the
//! `requested_execution_at` queue, plus a background pruning sweep.

use std::sync::Arc;

use clap::Parser;
use shp_core::SystemClock;
use shp_daemon::Config;
use shp_herd::{DryRunHerd, Herd, RealHerd};
use shp_notify::{NotifyAdapter, Notifier, SmtpNotifier};
use shp_scheduler::{PruneConfig, Scheduler, SchedulerConfig};
use shp_store::{PostgresStore, Store};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Shepherd testbed scheduler")]
struct Cli {
    /// Run the Herd through an in-memory temp-directory mock instead of SSH.
    #[arg(long)]
    dry_run: bool,

    /// Apply pending Store migrations at startup and exit.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shp_daemon::tracing_init::init("info,shp_scheduler=debug");
    let cli = Cli::parse();
    let mut config = Config::from_env();
    config.dry_run = config.dry_run || cli.dry_run;

    info!(dry_run = config.dry_run, tls_available = config.tls_available(), "shepherd scheduler starting");

    let store = PostgresStore::connect(&config.database_url).await?;
    store.migrate().await?;
    if cli.migrate_only {
        info!("migrations applied, exiting (--migrate-only)");
        return Ok(());
    }
    let store: Arc<dyn Store> = Arc::new(store);

    let herd: Arc<dyn Herd> = if config.dry_run {
        Arc::new(DryRunHerd::new(config.herd_hostnames.clone())?)
    } else {
        Arc::new(RealHerd::new(config.herd_hostnames.clone()))
    };

    let credentials = config.smtp_user.clone().zip(config.smtp_pass.clone());
    let mail: Arc<dyn NotifyAdapter> = Arc::new(SmtpNotifier::new(&config.smtp_relay, credentials, config.mail_from.clone())?);
    let notifier = Notifier::new(mail, config.admin_contact.clone());

    let scheduler_config = SchedulerConfig {
        only_elevated: config.only_elevated,
        dry_run: config.dry_run,
        experiment_root: config.experiment_root.clone(),
        ..SchedulerConfig::default()
    };

    let quota_defaults = shp_core::QuotaDefaults {
        duration: config.quota_duration,
        storage_bytes: config.quota_storage_bytes,
        experiment_root: config.experiment_root.clone(),
    };

    let prune_config = PruneConfig {
        age_max_user: config.prune_age_max_user,
        age_min_experiment: config.prune_age_min_experiment,
        age_max_experiment: config.prune_age_max_experiment,
        dry_run: config.prune_dry_run,
    };

    let prune_store = Arc::clone(&store);
    let prune_interval = config.prune_interval;
    tokio::spawn(async move {
        let clock = SystemClock;
        let quota = shp_core::QuotaEngine::new(&quota_defaults);
        loop {
            tokio::time::sleep(prune_interval).await;
            match shp_scheduler::prune::prune(prune_store.as_ref(), &quota, &clock, &prune_config).await {
                Ok(report) => info!(pruned = report.pruned.len(), freed_mib = report.freed_bytes / (1024 * 1024), "pruning sweep complete"),
                Err(err) => warn!(error = %err, "pruning sweep failed"),
            }
        }
    });

    let scheduler = Scheduler::new(store, herd, notifier, SystemClock, scheduler_config);
    let shutdown = Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    scheduler.run(shutdown).await?;
    Ok(())
}

// SPDX-License-Identifier: MIT

//! Entrypoint for the C7 HTTP API process: a stateless axum service, the
//! only process allowed to accept user-facing traffic.

use std::sync::Arc;

use clap::Parser;
use shp_api::{ApiConfig, AppState};
use shp_daemon::Config;
use shp_herd::{DryRunHerd, Herd, RealHerd};
use shp_notify::{NotifyAdapter, SmtpNotifier};
use shp_store::{PostgresStore, Store};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Shepherd testbed web API")]
struct Cli {
    /// Override the SHP_API_BIND environment setting.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shp_daemon::tracing_init::init("info,shp_api=debug,tower_http=debug");
    let cli = Cli::parse();
    let config = Config::from_env();
    let bind = cli.bind.unwrap_or_else(|| config.api_bind.clone());

    info!(tls_available = config.tls_available(), %bind, "shepherd api starting");

    let store = PostgresStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(store);

    let herd: Arc<dyn Herd> = if config.dry_run {
        Arc::new(DryRunHerd::new(config.herd_hostnames.clone())?)
    } else {
        Arc::new(RealHerd::new(config.herd_hostnames.clone()))
    };

    let credentials = config.smtp_user.clone().zip(config.smtp_pass.clone());
    let mail: Arc<dyn NotifyAdapter> = Arc::new(SmtpNotifier::new(&config.smtp_relay, credentials, config.mail_from.clone())?);

    let quota_defaults = Arc::new(shp_core::QuotaDefaults {
        duration: config.quota_duration,
        storage_bytes: config.quota_storage_bytes,
        experiment_root: config.experiment_root.clone(),
    });

    let api_config = Arc::new(ApiConfig {
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        admin_contact: config.admin_contact.clone(),
        testbed_name: config.testbed_name.clone(),
        experiment_root: config.experiment_root.clone(),
    });

    let state = AppState::new(store, herd, mail, quota_defaults, api_config);
    let app = shp_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

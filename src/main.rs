use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;

use voteauth::chain::{ChainRpc, ChainTxLifecycle, DirArtifactLoader, JsonRpcClient};
use voteauth::channels::web::{GatewayState, start_server};
use voteauth::cli::{Cli, Command, run_doctor_command};
use voteauth::config::Config;
use voteauth::db::libsql::LibSqlBackend;
use voteauth::db::Database;
use voteauth::privileged::CoordinatorSettings;
use voteauth::service::{AuthorityService, rotate_persisted_epoch};

/// How often expired challenges are swept.
const CHALLENGE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Serve { config } => serve(config.as_deref()).await,
        Command::RotateEpoch { config } => rotate_epoch(config.as_deref()).await,
        Command::Doctor { config, strict } => run_doctor_command(config.as_deref(), strict).await,
    }
}

/// `RUST_LOG` wins over the `voteauth=info` default; `LOG_FORMAT=json`
/// switches to structured output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("voteauth=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn open_database(config: &Config) -> anyhow::Result<Arc<LibSqlBackend>> {
    Ok(Arc::new(LibSqlBackend::new_local(&config.database.path).await?))
}

async fn serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::from_env_with_toml(config_path)?;
    let addr = config.server.socket_addr()?;

    let db: Arc<dyn Database> = open_database(&config).await?;

    let rpc = Arc::new(JsonRpcClient::dial(
        &config.chain.rpc_url,
        config.chain.rpc_timeout,
    )?);
    if let Some(expected) = config.chain.chain_id {
        match rpc.chain_id().await {
            Ok(actual) if actual != expected => tracing::warn!(
                expected,
                actual,
                "Chain RPC reports a different chain id than configured"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Chain RPC not reachable at startup"),
        }
    }
    let chain = Arc::new(ChainTxLifecycle::new(
        rpc,
        Arc::new(DirArtifactLoader::new(&config.chain.artifacts_dir)),
        config.chain.deployment_gas_limit,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = Arc::new(
        AuthorityService::open(
            db,
            chain,
            &config.auth,
            CoordinatorSettings {
                contract_name: config.chain.nft_contract.clone(),
                root_email: config.chain.root_email.clone(),
                receipt_poll_interval: config.chain.receipt_poll_interval,
                receipt_timeout: config.chain.receipt_timeout,
            },
            shutdown_rx.clone(),
        )
        .await?,
    );

    let purge = {
        let service = service.clone();
        let mut shutdown = shutdown_rx;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHALLENGE_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.purge_expired_challenges();
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    let state = GatewayState::new(service);
    let bound = start_server(addr, state.clone(), config.server.cors_origin.as_deref()).await?;
    tracing::info!(addr = %bound, rpc = %config.chain.rpc_url, "voteauth started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // Wakes receipt waits and the purge task, then stops accepting requests.
    let _ = shutdown_tx.send(true);
    state.shutdown().await;
    let _ = purge.await;

    Ok(())
}

async fn rotate_epoch(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::from_env_with_toml(config_path)?;
    let db = open_database(&config).await?;
    db.run_migrations().await?;
    rotate_persisted_epoch(&*db).await?;
    println!("Session epoch rotated. Restart the gateway to invalidate issued tokens.");
    Ok(())
}

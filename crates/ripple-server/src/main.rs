use anyhow::Result;
use tracing::info;

mod auth;
mod config;
mod contacts;
mod db;
mod delivery;
mod mailbox;
mod server;
mod storage;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    info!("ripple server starting");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env()?;
    let database = db::Database::open(&config.database).await?;
    db::MigrationRunner::all().run(&database).await?;

    server::start(config, database).await?;

    Ok(())
}

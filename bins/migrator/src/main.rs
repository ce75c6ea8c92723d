//! Schema migration runner for Defter.
//!
//! Connects with the same layered configuration as the server, so
//! `DEFTER__DATABASE__URL` and `config/{RUN_MODE}.toml` apply here too.
//!
//! Usage:
//!   migrator [up]     - Apply pending migrations
//!   migrator down [n] - Roll back the last `n` migrations (default 1)
//!   migrator status   - List applied and pending migrations
//!   migrator fresh    - Drop everything and re-apply

use anyhow::{Context, bail};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use defter_db::migration::Migrator;
use defter_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sea_orm_migration=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "up".to_string());

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = defter_db::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => {
            let steps = match args.next() {
                Some(n) => n.parse().context("step count must be a positive integer")?,
                None => 1,
            };
            Migrator::down(&db, Some(steps)).await?;
        }
        "status" => Migrator::status(&db).await?,
        "fresh" => Migrator::fresh(&db).await?,
        other => bail!("unknown command `{other}`; expected up, down, status or fresh"),
    }
    Ok(())
}

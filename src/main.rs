use migration::{Migrator, MigratorTrait};
use studiova::{services::LedgerService, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scheduled maintenance entry point: apply pending migrations, then
/// run one expiry-sweep pass over the credit ledger. The platform
/// scheduler invokes this periodically; the sweep is a pure status
/// flip, so re-running after a failure is always safe.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,studiova=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Studiova ledger maintenance");

    // Load configuration
    let config = Config::load()?;

    // Connect and migrate
    let db = sea_orm::Database::connect(&config.database.url).await?;
    Migrator::up(&db, None).await?;

    tracing::info!("Database ready, running expiry sweep");

    let ledger = LedgerService::new(db);
    let expired = ledger
        .sweep_expired(time::OffsetDateTime::now_utc())
        .await
        .map_err(|e| anyhow::anyhow!("expiry sweep failed: {e}"))?;

    tracing::info!("Expiry sweep complete: {} batches expired", expired);

    Ok(())
}

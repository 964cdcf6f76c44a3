/// Purge expired data based on retention policy
/// Run daily (e.g., via cron job: 0 2 * * * /app/purge-data)
///
/// Usage: purge-data [--retention-days N]
///   --retention-days N : Keep read notifications for N days (default from env, 90)

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use pharmacie_api::services::cron::CronService;

#[derive(Parser)]
#[command(name = "purge-data", about = "Purge expired data from the pharmacie database")]
struct Args {
    /// Days to keep read notifications (overrides NOTIFICATION_RETENTION_DAYS)
    #[arg(long)]
    retention_days: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
    let retention_days = match args.retention_days {
        Some(days) => days,
        None => std::env::var("NOTIFICATION_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Starting data purge job...");
    let report = CronService::purge_expired_data(&pool, retention_days).await?;
    tracing::info!(
        notifications = report.notifications,
        email_tokens = report.email_tokens,
        gardes = report.gardes,
        "Data purge job completed"
    );

    Ok(())
}

pub mod tenant;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the public-schema migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Re-provision every assigned catalog schema (idempotent, safe on every startup).
pub async fn provision_all_catalogs(pool: &PgPool) -> anyhow::Result<()> {
    let schemas: Vec<String> = sqlx::query_scalar(
        "SELECT base_medicament FROM pharmacies
         WHERE base_medicament IS NOT NULL AND approval_status = 'approuvee'",
    )
    .fetch_all(pool)
    .await?;

    for schema in schemas {
        if !tenant::is_catalog_schema(&schema) {
            tracing::warn!("Skipping malformed catalog schema name: {schema}");
            continue;
        }
        tenant::provision_catalog_schema(pool, &schema).await?;
        tracing::info!("Catalog schema ready: {schema}");
    }
    Ok(())
}

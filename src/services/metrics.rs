use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::tenant::is_catalog_schema;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Tentatives de login par statut",
        &["status"]
    ).unwrap();

    pub static ref ORDERS_COUNTER: CounterVec = register_counter_vec!(
        "api_commandes_created_total",
        "Commandes acceptées par mode de retrait",
        &["fulfilment"]
    ).unwrap();

    pub static ref ORDERS_REJECTED_COUNTER: CounterVec = register_counter_vec!(
        "api_commandes_rejected_total",
        "Commandes refusées par motif",
        &["reason"]
    ).unwrap();

    pub static ref STATUS_TRANSITIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_commande_status_total",
        "Changements de statut de commande",
        &["status"]
    ).unwrap();

    pub static ref NOTIFICATIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_notifications_created_total",
        "Notifications enregistrées par type",
        &["kind"]
    ).unwrap();

    pub static ref PUSH_FAILURES_COUNTER: CounterVec = register_counter_vec!(
        "api_push_failures_total",
        "Échecs d'envoi push par plateforme",
        &["platform"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref PHARMACIES_GAUGE: GaugeVec = register_gauge_vec!(
        "pharmacies_total",
        "Pharmacies par statut d'approbation",
        &["status"]
    ).unwrap();

    pub static ref PENDING_DEMANDES_GAUGE: Gauge = register_gauge!(
        "demandes_pending_total",
        "Demandes en attente de validation"
    ).unwrap();

    pub static ref OUT_OF_STOCK_GAUGE: GaugeVec = register_gauge_vec!(
        "catalog_out_of_stock_total",
        "Médicaments en rupture par catalogue",
        &["catalog"]
    ).unwrap();
}

/// Spawn the periodic collection of business gauges (every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let by_status: Vec<(String, i64)> = sqlx::query_as(
        "SELECT approval_status, COUNT(*)::BIGINT FROM pharmacies GROUP BY approval_status",
    )
    .fetch_all(pool)
    .await?;
    for (status, count) in by_status {
        PHARMACIES_GAUGE.with_label_values(&[&status]).set(count as f64);
    }

    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM demandes WHERE status = 'en_attente'")
            .fetch_one(pool)
            .await?;
    PENDING_DEMANDES_GAUGE.set(pending as f64);

    let catalogs: Vec<String> = sqlx::query_scalar(
        "SELECT base_medicament FROM pharmacies
         WHERE approval_status = 'approuvee' AND base_medicament IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    for schema in catalogs.iter().filter(|s| is_catalog_schema(s)) {
        let out: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".medicaments WHERE stock = 0"#
        ))
        .fetch_one(pool)
        .await
        .unwrap_or(0);
        OUT_OF_STOCK_GAUGE.with_label_values(&[schema]).set(out as f64);
    }

    info!("Metrics: collected for {} catalog(s)", catalogs.len());
    Ok(())
}

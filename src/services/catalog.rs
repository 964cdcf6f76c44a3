use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ApiError, ApiResult},
    models::{
        medicament::{
            CatalogQuery, CreateMedicamentRequest, Medicament, SearchHit, UpdateMedicamentRequest,
            MEDICAMENT_COLS,
        },
        pharmacy::{Pharmacy, PharmacyView},
        PaginationQuery,
    },
    services::{notifications::Notifier, stock_alerts},
};

pub struct CatalogService;

impl CatalogService {
    pub async fn list(
        pool: &PgPool,
        catalog: &TenantCatalog,
        query: &CatalogQuery,
    ) -> anyhow::Result<Vec<Medicament>> {
        let table = catalog.medicaments();
        let page = PaginationQuery { page: query.page, per_page: query.per_page };
        let pattern = query.search.as_deref().map(|s| format!("%{}%", s.trim()));

        let rows = sqlx::query_as::<_, Medicament>(&format!(
            "SELECT {MEDICAMENT_COLS} FROM {table}
             WHERE ($1::TEXT IS NULL OR name ILIKE $1 OR description ILIKE $1)
               AND ($2::TEXT IS NULL OR category = $2)
               AND ($3 = FALSE OR stock > 0)
             ORDER BY name
             LIMIT $4 OFFSET $5"
        ))
        .bind(pattern)
        .bind(&query.category)
        .bind(query.in_stock)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(pool: &PgPool, catalog: &TenantCatalog, id: Uuid) -> ApiResult<Medicament> {
        let table = catalog.medicaments();
        sqlx::query_as::<_, Medicament>(&format!(
            "SELECT {MEDICAMENT_COLS} FROM {table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Médicament"))
    }

    pub async fn create(
        pool: &PgPool,
        catalog: &TenantCatalog,
        req: &CreateMedicamentRequest,
    ) -> ApiResult<Medicament> {
        if req.name.trim().is_empty() {
            return Err(ApiError::bad_request("Le nom du médicament est requis"));
        }
        validate_amounts(Some(req.price), Some(req.stock))?;

        let table = catalog.medicaments();
        let med = sqlx::query_as::<_, Medicament>(&format!(
            "INSERT INTO {table} (name, description, category, price, stock, requires_prescription)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MEDICAMENT_COLS}"
        ))
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(&req.category)
        .bind(req.price)
        .bind(req.stock)
        .bind(req.requires_prescription)
        .fetch_one(pool)
        .await?;

        tracing::info!(catalog = catalog.schema(), medicament_id = %med.id, "medicament created");
        Ok(med)
    }

    /// Update a medicament. A restock (0 → positive) fires the stock alerts
    /// registered on it, in the same transaction.
    pub async fn update(
        pool: &PgPool,
        notifier: &Notifier,
        pharmacy: &Pharmacy,
        catalog: &TenantCatalog,
        id: Uuid,
        req: &UpdateMedicamentRequest,
    ) -> ApiResult<Medicament> {
        if matches!(&req.name, Some(n) if n.trim().is_empty()) {
            return Err(ApiError::bad_request("Le nom du médicament est requis"));
        }
        validate_amounts(req.price, req.stock)?;

        let table = catalog.medicaments();
        let mut tx = pool.begin().await?;

        let previous_stock: i32 = sqlx::query_scalar(&format!(
            "SELECT stock FROM {table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Médicament"))?;

        let med = sqlx::query_as::<_, Medicament>(&format!(
            "UPDATE {table} SET
               name                  = COALESCE($2, name),
               description           = COALESCE($3, description),
               category              = COALESCE($4, category),
               price                 = COALESCE($5, price),
               stock                 = COALESCE($6, stock),
               requires_prescription = COALESCE($7, requires_prescription),
               updated_at            = NOW()
             WHERE id = $1
             RETURNING {MEDICAMENT_COLS}"
        ))
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(&req.category)
        .bind(req.price)
        .bind(req.stock)
        .bind(req.requires_prescription)
        .fetch_one(&mut *tx)
        .await?;

        let alerts = if previous_stock == 0 && med.stock > 0 {
            stock_alerts::fire(&mut *tx, pharmacy, &med).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;
        notifier.dispatch(pool, &alerts);
        Ok(med)
    }

    /// Add `delta` (possibly negative) to the stock of the locked row; never
    /// below zero.
    pub async fn adjust_stock(
        pool: &PgPool,
        notifier: &Notifier,
        pharmacy: &Pharmacy,
        catalog: &TenantCatalog,
        id: Uuid,
        delta: i32,
    ) -> ApiResult<Medicament> {
        let table = catalog.medicaments();
        let mut tx = pool.begin().await?;

        let previous_stock: i32 = sqlx::query_scalar(&format!(
            "SELECT stock FROM {table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Médicament"))?;

        if previous_stock.checked_add(delta).filter(|s| *s >= 0).is_none() {
            return Err(ApiError::bad_request("Le stock ne peut pas devenir négatif"));
        }

        let med = sqlx::query_as::<_, Medicament>(&format!(
            "UPDATE {table} SET stock = stock + $2, updated_at = NOW()
             WHERE id = $1 AND stock + $2 >= 0
             RETURNING {MEDICAMENT_COLS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::bad_request("Le stock ne peut pas devenir négatif"))?;

        let alerts = if previous_stock == 0 && med.stock > 0 {
            stock_alerts::fire(&mut *tx, pharmacy, &med).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;
        tracing::info!(catalog = catalog.schema(), medicament_id = %id, delta, stock = med.stock, "stock adjusted");
        notifier.dispatch(pool, &alerts);
        Ok(med)
    }

    pub async fn delete(pool: &PgPool, catalog: &TenantCatalog, id: Uuid) -> ApiResult<()> {
        let table = catalog.medicaments();
        let mut tx = pool.begin().await?;

        let res = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::not_found("Médicament"));
        }

        // Cart lines and alerts point into the catalog without a foreign key.
        sqlx::query(
            "DELETE FROM cart_items ci USING carts c
             WHERE ci.cart_id = c.id AND c.pharmacy_id = $1 AND ci.medicament_id = $2",
        )
        .bind(catalog.pharmacy_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM stock_alerts WHERE pharmacy_id = $1 AND medicament_id = $2")
            .bind(catalog.pharmacy_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Search every approved catalog for medicaments in stock whose name
    /// matches `term`. Pharmacies without a match are omitted.
    pub async fn search_all(pool: &PgPool, term: &str) -> ApiResult<Vec<SearchHit>> {
        let term = term.trim();
        if term.len() < 2 {
            return Err(ApiError::bad_request("La recherche doit contenir au moins 2 caractères"));
        }
        let pattern = format!("%{term}%");

        let pharmacies = sqlx::query_as::<_, Pharmacy>(
            "SELECT * FROM pharmacies
             WHERE approval_status = 'approuvee' AND base_medicament IS NOT NULL
             ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        let mut hits = Vec::new();
        for pharmacy in pharmacies {
            let catalog = match TenantCatalog::for_pharmacy(&pharmacy) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let table = catalog.medicaments();
            let meds = match sqlx::query_as::<_, Medicament>(&format!(
                "SELECT {MEDICAMENT_COLS} FROM {table}
                 WHERE name ILIKE $1 AND stock > 0
                 ORDER BY price, name
                 LIMIT 20"
            ))
            .bind(&pattern)
            .fetch_all(pool)
            .await
            {
                Ok(m) => m,
                Err(e) => {
                    // One broken catalog must not hide the others.
                    tracing::warn!(catalog = catalog.schema(), "catalog search failed: {e}");
                    continue;
                }
            };
            if !meds.is_empty() {
                hits.push(SearchHit { pharmacy: PharmacyView::from(pharmacy), medicaments: meds });
            }
        }
        Ok(hits)
    }
}

/// Highest accepted unit price, in the smallest currency unit.
pub const MAX_PRICE: i64 = 1_000_000_000;

fn validate_amounts(price: Option<i64>, stock: Option<i32>) -> ApiResult<()> {
    if matches!(price, Some(p) if p < 0) {
        return Err(ApiError::bad_request("Le prix doit être positif"));
    }
    if matches!(price, Some(p) if p > MAX_PRICE) {
        return Err(ApiError::bad_request("Le prix dépasse le maximum autorisé"));
    }
    if matches!(stock, Some(s) if s < 0) {
        return Err(ApiError::bad_request("Le stock doit être positif"));
    }
    Ok(())
}

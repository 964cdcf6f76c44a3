use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{error::ApiError, models::pharmacy::Pharmacy};

const CATALOG_PREFIX: &str = "pharmacie_";

/// Validates that a slug only contains lowercase ASCII letters, digits and hyphens,
/// does not start or end with a hyphen, and is between 2 and 50 characters.
/// Slugs end up inside format!() schema queries.
pub fn is_valid_slug(s: &str) -> bool {
    let len = s.len();
    (2..=50).contains(&len)
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// Derive a slug from a pharmacy name: accents folded, everything else non
/// alphanumeric collapsed into single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            c => c,
        };
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug = slug.trim_end_matches('-').to_string();
    slug.truncate(40);
    slug.trim_end_matches('-').to_string()
}

pub fn catalog_schema_name(slug: &str) -> String {
    format!("{CATALOG_PREFIX}{}", slug.to_lowercase().replace('-', "_"))
}

/// True for names produced by [`catalog_schema_name`] from a valid slug.
pub fn is_catalog_schema(name: &str) -> bool {
    match name.strip_prefix(CATALOG_PREFIX) {
        Some(rest) => {
            !rest.is_empty()
                && rest.len() <= 50
                && rest.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    }
}

/// Handle to one pharmacy's catalog schema. Every catalog query takes one of
/// these explicitly; there is no ambient tenant connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantCatalog {
    pub pharmacy_id: Uuid,
    schema: String,
}

impl TenantCatalog {
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Fully qualified medicaments table name.
    pub fn medicaments(&self) -> String {
        format!("\"{}\".medicaments", self.schema)
    }

    /// Resolve from an already loaded pharmacy row.
    pub fn for_pharmacy(pharmacy: &Pharmacy) -> Result<Self, ApiError> {
        if !pharmacy.is_approved() {
            return Err(ApiError::CatalogUnavailable);
        }
        let schema = pharmacy
            .base_medicament
            .as_deref()
            .ok_or(ApiError::CatalogUnavailable)?;
        if !is_catalog_schema(schema) {
            tracing::error!(pharmacy_id = %pharmacy.id, "invalid catalog schema name {schema:?}");
            return Err(ApiError::CatalogUnavailable);
        }
        Ok(Self {
            pharmacy_id: pharmacy.id,
            schema: schema.to_string(),
        })
    }

    /// Load the pharmacy and resolve its catalog.
    pub async fn resolve<'e, E: PgExecutor<'e>>(
        exec: E,
        pharmacy_id: Uuid,
    ) -> Result<(Pharmacy, Self), ApiError> {
        let pharmacy = sqlx::query_as::<_, Pharmacy>("SELECT * FROM pharmacies WHERE id = $1")
            .bind(pharmacy_id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| ApiError::not_found("Pharmacie"))?;
        let catalog = Self::for_pharmacy(&pharmacy)?;
        Ok((pharmacy, catalog))
    }

    /// Resolve the catalog of the pharmacy owned by `owner_id`.
    pub async fn resolve_owned<'e, E: PgExecutor<'e>>(
        exec: E,
        owner_id: Uuid,
    ) -> Result<(Pharmacy, Self), ApiError> {
        let pharmacy = sqlx::query_as::<_, Pharmacy>("SELECT * FROM pharmacies WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| ApiError::not_found("Pharmacie"))?;
        let catalog = Self::for_pharmacy(&pharmacy)?;
        Ok((pharmacy, catalog))
    }
}

/// Provision a pharmacy catalog schema. Idempotent.
/// Called when an admin approves a pharmacy and at startup.
pub async fn provision_catalog_schema(pool: &PgPool, schema: &str) -> anyhow::Result<()> {
    anyhow::ensure!(is_catalog_schema(schema), "invalid catalog schema name: {schema}");

    sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(pool)
        .await?;

    // --- Medicaments ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".medicaments (
            id                     UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            name                   VARCHAR(255) NOT NULL,
            description            TEXT,
            category               VARCHAR(128),
            price                  BIGINT NOT NULL CHECK (price >= 0),
            stock                  INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
            requires_prescription  BOOLEAN NOT NULL DEFAULT FALSE,
            created_at             TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at             TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"CREATE INDEX IF NOT EXISTS medicaments_name_idx
           ON "{schema}".medicaments (LOWER(name))"#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Drop a catalog schema and everything in it.
pub async fn drop_catalog_schema(pool: &PgPool, schema: &str) -> anyhow::Result<()> {
    anyhow::ensure!(is_catalog_schema(schema), "invalid catalog schema name: {schema}");
    sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pharmacy(status: &str, base: Option<&str>) -> Pharmacy {
        let now = Utc::now();
        Pharmacy {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            slug: "du-centre".into(),
            name: "Pharmacie du Centre".into(),
            address: "2 avenue Habib Bourguiba".into(),
            city: "Sfax".into(),
            phone: None,
            opening_hours: None,
            delivery_available: false,
            approval_status: status.into(),
            base_medicament: base.map(str::to_string),
            garde_start: None,
            garde_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn slugify_folds_accents_and_separators() {
        assert_eq!(slugify("Pharmacie de l'Étoile"), "pharmacie-de-l-etoile");
        assert_eq!(slugify("  --Centrale 24/7-- "), "centrale-24-7");
        assert!(is_valid_slug(&slugify("Pharmacie Ibn Sina")));
    }

    #[test]
    fn slug_validation_rejects_injection() {
        assert!(is_valid_slug("centrale-2"));
        assert!(!is_valid_slug("a"));
        assert!(!is_valid_slug("-centrale"));
        assert!(!is_valid_slug("x\"; DROP SCHEMA public; --"));
    }

    #[test]
    fn schema_names_are_prefixed_and_checked() {
        assert_eq!(catalog_schema_name("du-centre"), "pharmacie_du_centre");
        assert!(is_catalog_schema("pharmacie_du_centre"));
        assert!(!is_catalog_schema("pharmacie_"));
        assert!(!is_catalog_schema("public"));
        assert!(!is_catalog_schema("pharmacie_x\"y"));
    }

    #[test]
    fn resolver_requires_assigned_catalog() {
        let p = pharmacy("approuvee", Some("pharmacie_du_centre"));
        let catalog = TenantCatalog::for_pharmacy(&p).unwrap();
        assert_eq!(catalog.schema(), "pharmacie_du_centre");
        assert_eq!(catalog.medicaments(), "\"pharmacie_du_centre\".medicaments");

        let unassigned = pharmacy("approuvee", None);
        assert!(matches!(
            TenantCatalog::for_pharmacy(&unassigned),
            Err(ApiError::CatalogUnavailable)
        ));

        let pending = pharmacy("en_attente", Some("pharmacie_du_centre"));
        assert!(matches!(
            TenantCatalog::for_pharmacy(&pending),
            Err(ApiError::CatalogUnavailable)
        ));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::pharmacy::PharmacyView;

/// Row of a pharmacy catalog (`pharmacie_<slug>.medicaments`).
/// Prices are integer minor units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Medicament {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub requires_prescription: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MEDICAMENT_COLS: &str =
    "id, name, description, category, price, stock, requires_prescription, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateMedicamentRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub requires_prescription: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMedicamentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub stock: Option<i32>,
    pub requires_prescription: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// One pharmacy and the matching medicaments of its catalog.
#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub pharmacy: PharmacyView,
    pub medicaments: Vec<Medicament>,
}

#[derive(Debug, Deserialize)]
pub struct StockAlertRequest {
    pub pharmacy_id: Uuid,
    pub medicament_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i32,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    EnAttente,
    Approuvee,
    Rejetee,
    Supprimee,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::EnAttente => "en_attente",
            ApprovalStatus::Approuvee => "approuvee",
            ApprovalStatus::Rejetee => "rejetee",
            ApprovalStatus::Supprimee => "supprimee",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en_attente" => Ok(ApprovalStatus::EnAttente),
            "approuvee" => Ok(ApprovalStatus::Approuvee),
            "rejetee" => Ok(ApprovalStatus::Rejetee),
            "supprimee" => Ok(ApprovalStatus::Supprimee),
            _ => Err(anyhow::anyhow!("Unknown approval status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pharmacy {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub delivery_available: bool,
    pub approval_status: String,
    /// Catalog schema name, NULL until an admin approves the pharmacy.
    #[serde(skip_serializing)]
    pub base_medicament: Option<String>,
    pub garde_start: Option<DateTime<Utc>>,
    pub garde_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pharmacy {
    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approuvee.as_str()
    }

    /// A pharmacy is de garde while `now` falls inside its declared period.
    pub fn is_de_garde(&self, now: DateTime<Utc>) -> bool {
        match (self.garde_start, self.garde_end) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }
}

/// Pharmacy as returned to clients, with the computed garde flag.
#[derive(Debug, Clone, Serialize)]
pub struct PharmacyView {
    #[serde(flatten)]
    pub pharmacy: Pharmacy,
    pub de_garde: bool,
    pub catalog_available: bool,
}

impl From<Pharmacy> for PharmacyView {
    fn from(p: Pharmacy) -> Self {
        let de_garde = p.is_de_garde(Utc::now());
        let catalog_available = p.is_approved() && p.base_medicament.is_some();
        Self { pharmacy: p, de_garde, catalog_available }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PharmacyFilters {
    pub city: Option<String>,
    pub search: Option<String>,
    pub de_garde: Option<bool>,
    pub livraison: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminPharmacyQuery {
    pub status: Option<ApprovalStatus>,
}

#[derive(Debug, Deserialize)]
pub struct GardeRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Fields a pharmacy may ask to change; applied only after admin approval.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PharmacyModification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_available: Option<bool>,
}

impl PharmacyModification {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.phone.is_none()
            && self.opening_hours.is_none()
            && self.delivery_available.is_none()
    }
}

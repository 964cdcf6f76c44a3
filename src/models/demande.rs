use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of request awaiting admin approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DemandeKind {
    CreationPharmacie,
    ModificationProfil,
    SuppressionCompte,
}

impl DemandeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandeKind::CreationPharmacie => "creation_pharmacie",
            DemandeKind::ModificationProfil => "modification_profil",
            DemandeKind::SuppressionCompte => "suppression_compte",
        }
    }
}

impl std::str::FromStr for DemandeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creation_pharmacie" => Ok(DemandeKind::CreationPharmacie),
            "modification_profil" => Ok(DemandeKind::ModificationProfil),
            "suppression_compte" => Ok(DemandeKind::SuppressionCompte),
            _ => Err(anyhow::anyhow!("Unknown demande kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Demande {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub pharmacy_id: Option<Uuid>,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub admin_comment: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DemandeQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectDemandeRequest {
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeletionRequest {
    pub reason: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NouvelleCommande,
    StatutCommande,
    StockDisponible,
    Demande,
    Compte,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NouvelleCommande => "nouvelle_commande",
            NotificationKind::StatutCommande => "statut_commande",
            NotificationKind::StockDisponible => "stock_disponible",
            NotificationKind::Demande => "demande",
            NotificationKind::Compte => "compte",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub commande_id: Option<Uuid>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub lu: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification about to be persisted for one recipient.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub commande_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

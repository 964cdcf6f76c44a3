use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandeStatus {
    EnAttente,
    EnPreparation,
    Prete,
    Livree,
    Annulee,
}

impl CommandeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandeStatus::EnAttente => "en_attente",
            CommandeStatus::EnPreparation => "en_preparation",
            CommandeStatus::Prete => "prete",
            CommandeStatus::Livree => "livree",
            CommandeStatus::Annulee => "annulee",
        }
    }

    /// Human label used in notification texts.
    pub fn label(&self) -> &'static str {
        match self {
            CommandeStatus::EnAttente => "en attente",
            CommandeStatus::EnPreparation => "en préparation",
            CommandeStatus::Prete => "prête",
            CommandeStatus::Livree => "livrée",
            CommandeStatus::Annulee => "annulée",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandeStatus::Livree | CommandeStatus::Annulee)
    }

    /// Forward-only workflow; any non-terminal order may be cancelled.
    pub fn can_transition_to(&self, next: CommandeStatus) -> bool {
        use CommandeStatus::*;
        match (self, next) {
            (EnAttente, EnPreparation) | (EnPreparation, Prete) | (Prete, Livree) => true,
            (from, Annulee) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for CommandeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en_attente" => Ok(CommandeStatus::EnAttente),
            "en_preparation" => Ok(CommandeStatus::EnPreparation),
            "prete" => Ok(CommandeStatus::Prete),
            "livree" => Ok(CommandeStatus::Livree),
            "annulee" => Ok(CommandeStatus::Annulee),
            _ => Err(anyhow::anyhow!("Unknown commande status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Commande {
    pub id: Uuid,
    pub client_id: Uuid,
    pub pharmacy_id: Uuid,
    pub total: i64,
    pub delivery: bool,
    pub delivery_address: Option<String>,
    pub note: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item snapshot: price is the catalog price at order time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommandeItem {
    pub id: Uuid,
    pub commande_id: Uuid,
    pub medicament_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub requires_prescription: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandeWithItems {
    #[serde(flatten)]
    pub commande: Commande,
    pub items: Vec<CommandeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub medicament_id: Uuid,
    pub quantity: i32,
    /// Price the client saw; must equal the current catalog price.
    pub expected_price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommandeRequest {
    pub pharmacy_id: Uuid,
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub delivery: bool,
    pub delivery_address: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CommandeStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommandeQuery {
    pub status: Option<CommandeStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

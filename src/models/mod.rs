pub mod auth;
pub mod cart;
pub mod commande;
pub mod demande;
pub mod medicament;
pub mod notification;
pub mod pharmacy;
pub mod user;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationQuery {
    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page();
        (page - 1).saturating_mul(per_page)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pharmacy_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart line; name and price are snapshots taken when the item was added.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub cart_id: Uuid,
    pub medicament_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub pharmacy_name: String,
    pub items: Vec<CartItem>,
    pub total: i64,
}

impl CartView {
    pub fn new(cart: Cart, pharmacy_name: String, items: Vec<CartItem>) -> Self {
        // Display total only; checkout re-prices with overflow checks.
        let total = items
            .iter()
            .map(|i| i.unit_price.saturating_mul(i64::from(i.quantity)))
            .fold(0i64, i64::saturating_add);
        Self { cart, pharmacy_name, items, total }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub pharmacy_id: Uuid,
    pub medicament_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub delivery: bool,
    pub delivery_address: Option<String>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(cart_id: Uuid, unit_price: i64, quantity: i32) -> CartItem {
        CartItem {
            cart_id,
            medicament_id: Uuid::new_v4(),
            name: "Doliprane".into(),
            unit_price,
            quantity,
            added_at: Utc::now(),
        }
    }

    fn cart() -> Cart {
        let now = Utc::now();
        Cart { id: Uuid::new_v4(), user_id: Uuid::new_v4(), pharmacy_id: Uuid::new_v4(), created_at: now, updated_at: now }
    }

    #[test]
    fn total_sums_snapshot_lines() {
        let cart = cart();
        let items = vec![item(cart.id, 2_500, 2), item(cart.id, 4_200, 3)];
        let view = CartView::new(cart, "Pharmacie du Lac".into(), items);
        assert_eq!(view.total, 17_600);
    }

    #[test]
    fn huge_lines_saturate_instead_of_overflowing() {
        let cart = cart();
        let items = vec![item(cart.id, i64::MAX / 2, 3), item(cart.id, 1, 1)];
        let view = CartView::new(cart, "Pharmacie du Lac".into(), items);
        assert_eq!(view.total, i64::MAX);
    }
}

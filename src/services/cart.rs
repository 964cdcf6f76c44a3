use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ApiError, ApiResult},
    models::{
        cart::{AddCartItemRequest, Cart, CartItem, CartView, CheckoutRequest},
        commande::{CommandeWithItems, CreateCommandeRequest, OrderLineRequest},
    },
    services::{catalog::CatalogService, commandes::CommandeService, notifications::Notifier},
};

/// One cart per (client, pharmacy). Lines snapshot name and price when added;
/// checkout sends the snapshot price as the expected price, so a price change
/// since then refuses the order instead of charging silently.
pub struct CartService;

impl CartService {
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<CartView>> {
        let carts = sqlx::query_as::<_, Cart>(
            "SELECT * FROM carts WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut views = Vec::with_capacity(carts.len());
        for cart in carts {
            views.push(Self::view(pool, cart).await?);
        }
        Ok(views)
    }

    pub async fn get(pool: &PgPool, user_id: Uuid, pharmacy_id: Uuid) -> ApiResult<CartView> {
        let cart = Self::find(pool, user_id, pharmacy_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Panier"))?;
        Ok(Self::view(pool, cart).await?)
    }

    /// Add a medicament; adding one already in the cart sums the quantities.
    pub async fn add_item(pool: &PgPool, user_id: Uuid, req: &AddCartItemRequest) -> ApiResult<CartView> {
        if req.quantity <= 0 {
            return Err(ApiError::bad_request("La quantité doit être positive"));
        }
        let (_, catalog) = TenantCatalog::resolve(pool, req.pharmacy_id).await?;
        let med = CatalogService::get(pool, &catalog, req.medicament_id).await?;

        let already: i32 = match Self::find(pool, user_id, req.pharmacy_id).await? {
            Some(cart) => sqlx::query_scalar(
                "SELECT quantity FROM cart_items WHERE cart_id = $1 AND medicament_id = $2",
            )
            .bind(cart.id)
            .bind(med.id)
            .fetch_optional(pool)
            .await?
            .unwrap_or(0),
            None => 0,
        };
        let wanted = already
            .checked_add(req.quantity)
            .ok_or_else(|| ApiError::bad_request("Quantité invalide"))?;
        if wanted > med.stock {
            return Err(ApiError::bad_request(format!(
                "Stock insuffisant pour {} : {} disponible(s)",
                med.name, med.stock
            )));
        }

        let mut tx = pool.begin().await?;
        let cart = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (user_id, pharmacy_id) VALUES ($1, $2)
             ON CONFLICT (user_id, pharmacy_id) DO UPDATE SET updated_at = NOW()
             RETURNING *",
        )
        .bind(user_id)
        .bind(req.pharmacy_id)
        .fetch_one(&mut *tx)
        .await?;

        // Re-adding refreshes the snapshot to the current catalog values.
        sqlx::query(
            "INSERT INTO cart_items (cart_id, medicament_id, name, unit_price, quantity)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cart_id, medicament_id) DO UPDATE SET
               quantity   = cart_items.quantity + EXCLUDED.quantity,
               name       = EXCLUDED.name,
               unit_price = EXCLUDED.unit_price",
        )
        .bind(cart.id)
        .bind(med.id)
        .bind(&med.name)
        .bind(med.price)
        .bind(req.quantity)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Self::view(pool, cart).await?)
    }

    /// Set a line's quantity; 0 removes the line.
    pub async fn update_item(
        pool: &PgPool,
        user_id: Uuid,
        pharmacy_id: Uuid,
        medicament_id: Uuid,
        quantity: i32,
    ) -> ApiResult<CartView> {
        if quantity < 0 {
            return Err(ApiError::bad_request("La quantité doit être positive"));
        }
        if quantity == 0 {
            return Self::remove_item(pool, user_id, pharmacy_id, medicament_id).await;
        }
        let cart = Self::find(pool, user_id, pharmacy_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Panier"))?;

        let (_, catalog) = TenantCatalog::resolve(pool, pharmacy_id).await?;
        let med = CatalogService::get(pool, &catalog, medicament_id).await?;
        if quantity > med.stock {
            return Err(ApiError::bad_request(format!(
                "Stock insuffisant pour {} : {} disponible(s)",
                med.name, med.stock
            )));
        }

        let res = sqlx::query(
            "UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND medicament_id = $2",
        )
        .bind(cart.id)
        .bind(medicament_id)
        .bind(quantity)
        .execute(pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::not_found("Article"));
        }
        Self::touch(pool, cart.id).await?;
        Ok(Self::view(pool, cart).await?)
    }

    pub async fn remove_item(
        pool: &PgPool,
        user_id: Uuid,
        pharmacy_id: Uuid,
        medicament_id: Uuid,
    ) -> ApiResult<CartView> {
        let cart = Self::find(pool, user_id, pharmacy_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Panier"))?;
        let res = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND medicament_id = $2")
            .bind(cart.id)
            .bind(medicament_id)
            .execute(pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::not_found("Article"));
        }
        Self::touch(pool, cart.id).await?;
        Ok(Self::view(pool, cart).await?)
    }

    pub async fn clear(pool: &PgPool, user_id: Uuid, pharmacy_id: Uuid) -> ApiResult<()> {
        let res = sqlx::query("DELETE FROM carts WHERE user_id = $1 AND pharmacy_id = $2")
            .bind(user_id)
            .bind(pharmacy_id)
            .execute(pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::not_found("Panier"));
        }
        Ok(())
    }

    /// Turn the cart into an order. The cart is deleted by the order
    /// transaction on success and left untouched on failure.
    pub async fn checkout(
        pool: &PgPool,
        notifier: &Notifier,
        user_id: Uuid,
        pharmacy_id: Uuid,
        req: &CheckoutRequest,
    ) -> ApiResult<CommandeWithItems> {
        let cart = Self::find(pool, user_id, pharmacy_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Panier"))?;
        let items = Self::items(pool, cart.id).await?;
        if items.is_empty() {
            return Err(ApiError::bad_request("Le panier est vide"));
        }

        let order = CreateCommandeRequest {
            pharmacy_id,
            items: order_lines(&items),
            delivery: req.delivery,
            delivery_address: req.delivery_address.clone(),
            note: req.note.clone(),
        };
        CommandeService::create(pool, notifier, user_id, &order).await
    }

    async fn find(pool: &PgPool, user_id: Uuid, pharmacy_id: Uuid) -> anyhow::Result<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>(
            "SELECT * FROM carts WHERE user_id = $1 AND pharmacy_id = $2",
        )
        .bind(user_id)
        .bind(pharmacy_id)
        .fetch_optional(pool)
        .await?;
        Ok(cart)
    }

    async fn items(pool: &PgPool, cart_id: Uuid) -> anyhow::Result<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            "SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY added_at",
        )
        .bind(cart_id)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    async fn touch(pool: &PgPool, cart_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn view(pool: &PgPool, cart: Cart) -> anyhow::Result<CartView> {
        let pharmacy_name: String = sqlx::query_scalar("SELECT name FROM pharmacies WHERE id = $1")
            .bind(cart.pharmacy_id)
            .fetch_one(pool)
            .await?;
        let items = Self::items(pool, cart.id).await?;
        Ok(CartView::new(cart, pharmacy_name, items))
    }
}

fn order_lines(items: &[CartItem]) -> Vec<OrderLineRequest> {
    items
        .iter()
        .map(|i| OrderLineRequest {
            medicament_id: i.medicament_id,
            quantity: i.quantity,
            expected_price: i.unit_price,
        })
        .collect()
}

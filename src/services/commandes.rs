//! Order placement and the order status workflow.
//!
//! Placement runs in a single transaction spanning the public schema
//! (commande, items, cart, notifications) and the pharmacy catalog schema
//! (stock). Medicament rows are locked with `FOR UPDATE` before the stock
//! check, so two concurrent orders cannot both pass it. Real-time events and
//! push are emitted only after commit.

use std::collections::HashMap;

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        commande::{
            Commande, CommandeItem, CommandeQuery, CommandeStatus, CommandeWithItems,
            CreateCommandeRequest, OrderLineRequest,
        },
        medicament::{Medicament, MEDICAMENT_COLS},
        notification::{NewNotification, NotificationKind},
        pharmacy::Pharmacy,
        user::UserRole,
        PaginationQuery,
    },
    services::{
        metrics::{ORDERS_COUNTER, ORDERS_REJECTED_COUNTER, STATUS_TRANSITIONS_COUNTER},
        notifications::{self, Notifier},
        realtime::{Channel, RealtimeEvent},
        stock_alerts,
    },
};

/// Line accepted against the catalog, priced at the server-side price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub medicament_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub requires_prescription: bool,
}

/// Why an order was refused. Any single rejection refuses the whole order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    InvalidQuantity(Uuid),
    ConflictingPrices(Uuid),
    Missing(Uuid),
    OutOfStock { name: String, available: i32, requested: i32 },
    PriceChanged { name: String, expected: i64, current: i64 },
    TotalOverflow,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty",
            Rejection::InvalidQuantity(_) => "invalid_quantity",
            Rejection::ConflictingPrices(_) => "conflicting_prices",
            Rejection::Missing(_) => "missing",
            Rejection::OutOfStock { .. } => "out_of_stock",
            Rejection::PriceChanged { .. } => "price_changed",
            Rejection::TotalOverflow => "overflow",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::Empty => "La commande ne contient aucun article".to_string(),
            Rejection::InvalidQuantity(id) => format!("Quantité invalide pour le médicament {id}"),
            Rejection::ConflictingPrices(id) => {
                format!("Prix contradictoires pour le médicament {id}")
            }
            Rejection::Missing(id) => format!("Médicament {id} introuvable dans ce catalogue"),
            Rejection::OutOfStock { name, available, requested } => format!(
                "Stock insuffisant pour {name} : {available} disponible(s), {requested} demandé(s)"
            ),
            Rejection::PriceChanged { name, expected, current } => format!(
                "Le prix de {name} a changé ({expected} → {current}), veuillez actualiser votre panier"
            ),
            Rejection::TotalOverflow => "Montant de commande invalide".to_string(),
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(r: Rejection) -> Self {
        ORDERS_REJECTED_COUNTER.with_label_values(&[r.reason()]).inc();
        ApiError::BadRequest(r.message())
    }
}

/// Merge repeated medicaments into one line, keeping first-seen order.
pub fn merge_lines(items: &[OrderLineRequest]) -> Result<Vec<OrderLineRequest>, Rejection> {
    if items.is_empty() {
        return Err(Rejection::Empty);
    }
    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity <= 0 {
            return Err(Rejection::InvalidQuantity(item.medicament_id));
        }
        match merged.iter_mut().find(|l| l.medicament_id == item.medicament_id) {
            Some(line) => {
                if line.expected_price != item.expected_price {
                    return Err(Rejection::ConflictingPrices(item.medicament_id));
                }
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(Rejection::InvalidQuantity(item.medicament_id))?;
            }
            None => merged.push(item.clone()),
        }
    }
    Ok(merged)
}

/// Check every line against the current catalog rows and price the order.
/// Returns the priced lines and total = Σ(server price × quantity).
pub fn price_lines(
    lines: &[OrderLineRequest],
    catalog: &HashMap<Uuid, Medicament>,
) -> Result<(Vec<PricedLine>, i64), Rejection> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut total: i64 = 0;
    for line in lines {
        let med = catalog
            .get(&line.medicament_id)
            .ok_or(Rejection::Missing(line.medicament_id))?;
        if med.stock < line.quantity {
            return Err(Rejection::OutOfStock {
                name: med.name.clone(),
                available: med.stock,
                requested: line.quantity,
            });
        }
        if med.price != line.expected_price {
            return Err(Rejection::PriceChanged {
                name: med.name.clone(),
                expected: line.expected_price,
                current: med.price,
            });
        }
        let subtotal = med
            .price
            .checked_mul(i64::from(line.quantity))
            .ok_or(Rejection::TotalOverflow)?;
        total = total.checked_add(subtotal).ok_or(Rejection::TotalOverflow)?;
        priced.push(PricedLine {
            medicament_id: med.id,
            name: med.name.clone(),
            unit_price: med.price,
            quantity: line.quantity,
            requires_prescription: med.requires_prescription,
        });
    }
    Ok((priced, total))
}

pub struct CommandeService;

impl CommandeService {
    /// Place an order against one pharmacy catalog.
    pub async fn create(
        pool: &PgPool,
        notifier: &Notifier,
        client_id: Uuid,
        req: &CreateCommandeRequest,
    ) -> ApiResult<CommandeWithItems> {
        let lines = merge_lines(&req.items)?;
        let delivery_address = req
            .delivery_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        if req.delivery && delivery_address.is_none() {
            return Err(ApiError::bad_request("Adresse de livraison requise"));
        }

        let mut tx = pool.begin().await?;

        let (pharmacy, catalog) = TenantCatalog::resolve(&mut *tx, req.pharmacy_id).await?;
        if req.delivery && !pharmacy.delivery_available {
            return Err(ApiError::bad_request("Cette pharmacie ne propose pas la livraison"));
        }

        // Lock in id order so concurrent orders on overlapping items cannot deadlock.
        let mut ids: Vec<Uuid> = lines.iter().map(|l| l.medicament_id).collect();
        ids.sort();
        let table = catalog.medicaments();
        let rows = sqlx::query_as::<_, Medicament>(&format!(
            "SELECT {MEDICAMENT_COLS} FROM {table}
             WHERE id = ANY($1)
             ORDER BY id
             FOR UPDATE"
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
        let by_id: HashMap<Uuid, Medicament> = rows.into_iter().map(|m| (m.id, m)).collect();

        let (priced, total) = price_lines(&lines, &by_id)?;

        let commande = sqlx::query_as::<_, Commande>(
            "INSERT INTO commandes (client_id, pharmacy_id, total, delivery, delivery_address, note)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(client_id)
        .bind(pharmacy.id)
        .bind(total)
        .bind(req.delivery)
        .bind(if req.delivery { delivery_address } else { None })
        .bind(&req.note)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for line in &priced {
            let item = sqlx::query_as::<_, CommandeItem>(
                "INSERT INTO commande_items
                    (commande_id, medicament_id, name, unit_price, quantity, requires_prescription)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *",
            )
            .bind(commande.id)
            .bind(line.medicament_id)
            .bind(&line.name)
            .bind(line.unit_price)
            .bind(line.quantity)
            .bind(line.requires_prescription)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);

            let updated = sqlx::query(&format!(
                "UPDATE {table} SET stock = stock - $2, updated_at = NOW()
                 WHERE id = $1 AND stock >= $2"
            ))
            .bind(line.medicament_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                // Rows are locked above; reaching this means the lock was not held.
                return Err(anyhow::anyhow!("stock decrement lost for {}", line.medicament_id).into());
            }
        }

        sqlx::query("DELETE FROM carts WHERE user_id = $1 AND pharmacy_id = $2")
            .bind(client_id)
            .bind(pharmacy.id)
            .execute(&mut *tx)
            .await?;

        let admins = notifications::admin_ids(&mut *tx).await?;
        let pending = new_order_notifications(&commande, &pharmacy, &admins);
        let created = notifications::create_many(&mut *tx, &pending).await?;

        tx.commit().await?;

        ORDERS_COUNTER.with_label_values(&[fulfilment_label(commande.delivery)]).inc();
        tracing::info!(
            commande_id = %commande.id,
            pharmacy_id = %pharmacy.id,
            total,
            items = items.len(),
            "commande created"
        );

        let view = CommandeWithItems { commande, items };
        notifier.dispatch(pool, &created);
        notifier
            .events
            .publish(&Channel::Pharmacy(pharmacy.id), RealtimeEvent::new("nouvelle_commande", &view));
        notifier
            .events
            .publish(&Channel::Admins, RealtimeEvent::new("nouvelle_commande", &view));
        Ok(view)
    }

    /// Move an order to `next`. Pharmacy owner and admins drive the workflow;
    /// the client may only cancel a pending order. Cancelling restores stock.
    pub async fn update_status(
        pool: &PgPool,
        notifier: &Notifier,
        actor: &AuthenticatedUser,
        id: Uuid,
        next: CommandeStatus,
    ) -> ApiResult<CommandeWithItems> {
        let mut tx = pool.begin().await?;

        let commande = sqlx::query_as::<_, Commande>("SELECT * FROM commandes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Commande"))?;
        let pharmacy = sqlx::query_as::<_, Pharmacy>("SELECT * FROM pharmacies WHERE id = $1")
            .bind(commande.pharmacy_id)
            .fetch_one(&mut *tx)
            .await?;

        let current: CommandeStatus = commande.status.parse()?;
        let allowed = match actor.role {
            UserRole::Admin => true,
            UserRole::Pharmacie => pharmacy.owner_id == actor.user_id,
            UserRole::Client => {
                commande.client_id == actor.user_id
                    && next == CommandeStatus::Annulee
                    && current == CommandeStatus::EnAttente
            }
        };
        if !allowed {
            return Err(ApiError::forbidden());
        }
        if !current.can_transition_to(next) {
            return Err(ApiError::bad_request(format!(
                "Transition de statut invalide : {current} → {next}"
            )));
        }

        let commande = sqlx::query_as::<_, Commande>(
            "UPDATE commandes SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let items = load_items(&mut *tx, id).await?;

        let mut restocked = Vec::new();
        if next == CommandeStatus::Annulee {
            match TenantCatalog::for_pharmacy(&pharmacy) {
                Ok(catalog) => {
                    let table = catalog.medicaments();
                    for item in &items {
                        // A medicament removed from the catalog since has nothing to restore.
                        let med = sqlx::query_as::<_, Medicament>(&format!(
                            "UPDATE {table} SET stock = stock + $2, updated_at = NOW()
                             WHERE id = $1
                             RETURNING {MEDICAMENT_COLS}"
                        ))
                        .bind(item.medicament_id)
                        .bind(item.quantity)
                        .fetch_optional(&mut *tx)
                        .await?;
                        if let Some(med) = med {
                            // Back from zero: this cancellation is a restock.
                            if med.stock == item.quantity {
                                restocked.extend(stock_alerts::fire(&mut *tx, &pharmacy, &med).await?);
                            }
                        }
                    }
                }
                Err(_) => tracing::warn!(
                    commande_id = %id,
                    "catalog unavailable, stock not restored on cancellation"
                ),
            }
        }

        let mut pending = vec![NewNotification {
            recipient_id: commande.client_id,
            commande_id: Some(commande.id),
            kind: NotificationKind::StatutCommande,
            title: "Mise à jour de votre commande".to_string(),
            message: format!(
                "Votre commande chez {} est maintenant {}.",
                pharmacy.name,
                next.label()
            ),
        }];
        if actor.role == UserRole::Client {
            pending.push(NewNotification {
                recipient_id: pharmacy.owner_id,
                commande_id: Some(commande.id),
                kind: NotificationKind::StatutCommande,
                title: "Commande annulée".to_string(),
                message: format!("Le client a annulé la commande {}.", short_id(commande.id)),
            });
        }
        let created = notifications::create_many(&mut *tx, &pending).await?;

        tx.commit().await?;

        STATUS_TRANSITIONS_COUNTER.with_label_values(&[next.as_str()]).inc();
        tracing::info!(commande_id = %id, from = %current, to = %next, actor = %actor.user_id, "commande status changed");

        let view = CommandeWithItems { commande, items };
        notifier.dispatch(pool, &created);
        notifier.dispatch(pool, &restocked);
        notifier
            .events
            .publish(&Channel::User(view.commande.client_id), RealtimeEvent::new("statut_commande", &view));
        notifier
            .events
            .publish(&Channel::Pharmacy(pharmacy.id), RealtimeEvent::new("statut_commande", &view));
        Ok(view)
    }

    /// Single order, visible to its client, its pharmacy owner and admins.
    pub async fn get(pool: &PgPool, actor: &AuthenticatedUser, id: Uuid) -> ApiResult<CommandeWithItems> {
        let commande = sqlx::query_as::<_, Commande>("SELECT * FROM commandes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Commande"))?;

        let visible = match actor.role {
            UserRole::Admin => true,
            UserRole::Client => commande.client_id == actor.user_id,
            UserRole::Pharmacie => {
                let owner: Option<Uuid> =
                    sqlx::query_scalar("SELECT owner_id FROM pharmacies WHERE id = $1")
                        .bind(commande.pharmacy_id)
                        .fetch_optional(pool)
                        .await?;
                owner == Some(actor.user_id)
            }
        };
        if !visible {
            return Err(ApiError::not_found("Commande"));
        }

        let items = load_items(pool, id).await?;
        Ok(CommandeWithItems { commande, items })
    }

    pub async fn list_for_client(
        pool: &PgPool,
        client_id: Uuid,
        query: &CommandeQuery,
    ) -> anyhow::Result<Vec<CommandeWithItems>> {
        Self::list(pool, Some(client_id), None, query).await
    }

    pub async fn list_for_pharmacy(
        pool: &PgPool,
        owner_id: Uuid,
        query: &CommandeQuery,
    ) -> ApiResult<Vec<CommandeWithItems>> {
        let pharmacy_id: Uuid = sqlx::query_scalar("SELECT id FROM pharmacies WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Pharmacie"))?;
        Ok(Self::list(pool, None, Some(pharmacy_id), query).await?)
    }

    pub async fn list_all(pool: &PgPool, query: &CommandeQuery) -> anyhow::Result<Vec<CommandeWithItems>> {
        Self::list(pool, None, None, query).await
    }

    async fn list(
        pool: &PgPool,
        client_id: Option<Uuid>,
        pharmacy_id: Option<Uuid>,
        query: &CommandeQuery,
    ) -> anyhow::Result<Vec<CommandeWithItems>> {
        let page = PaginationQuery { page: query.page, per_page: query.per_page };
        let commandes = sqlx::query_as::<_, Commande>(
            "SELECT * FROM commandes
             WHERE ($1::UUID IS NULL OR client_id = $1)
               AND ($2::UUID IS NULL OR pharmacy_id = $2)
               AND ($3::TEXT IS NULL OR status = $3)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5",
        )
        .bind(client_id)
        .bind(pharmacy_id)
        .bind(query.status.map(|s| s.as_str()))
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let ids: Vec<Uuid> = commandes.iter().map(|c| c.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<CommandeItem>> = HashMap::new();
        let items = sqlx::query_as::<_, CommandeItem>(
            "SELECT * FROM commande_items WHERE commande_id = ANY($1) ORDER BY name",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;
        for item in items {
            items_by_order.entry(item.commande_id).or_default().push(item);
        }

        Ok(commandes
            .into_iter()
            .map(|c| {
                let items = items_by_order.remove(&c.id).unwrap_or_default();
                CommandeWithItems { commande: c, items }
            })
            .collect())
    }
}

async fn load_items<'e, E: PgExecutor<'e>>(exec: E, commande_id: Uuid) -> anyhow::Result<Vec<CommandeItem>> {
    let items = sqlx::query_as::<_, CommandeItem>(
        "SELECT * FROM commande_items WHERE commande_id = $1 ORDER BY name",
    )
    .bind(commande_id)
    .fetch_all(exec)
    .await?;
    Ok(items)
}

/// Label of the orders counter; bounded, unlike pharmacy slugs.
fn fulfilment_label(delivery: bool) -> &'static str {
    if delivery {
        "livraison"
    } else {
        "retrait"
    }
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// One notification for the client, one for the pharmacy owner, one per admin.
fn new_order_notifications(
    commande: &Commande,
    pharmacy: &Pharmacy,
    admins: &[Uuid],
) -> Vec<NewNotification> {
    let reference = short_id(commande.id);
    notifications::order_recipients(commande.client_id, pharmacy.owner_id, admins)
        .into_iter()
        .map(|recipient_id| {
            let (title, message) = if recipient_id == commande.client_id {
                (
                    "Commande envoyée".to_string(),
                    format!(
                        "Votre commande {reference} a été transmise à {}. Total : {}.",
                        pharmacy.name, commande.total
                    ),
                )
            } else if recipient_id == pharmacy.owner_id {
                (
                    "Nouvelle commande".to_string(),
                    format!("Nouvelle commande {reference} d'un montant de {}.", commande.total),
                )
            } else {
                (
                    "Nouvelle commande sur la plateforme".to_string(),
                    format!("Commande {reference} passée chez {}.", pharmacy.name),
                )
            };
            NewNotification {
                recipient_id,
                commande_id: Some(commande.id),
                kind: NotificationKind::NouvelleCommande,
                title,
                message,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn med(name: &str, price: i64, stock: i32) -> Medicament {
        let now = Utc::now();
        Medicament {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            category: None,
            price,
            stock,
            requires_prescription: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(m: &Medicament, quantity: i32) -> OrderLineRequest {
        OrderLineRequest { medicament_id: m.id, quantity, expected_price: m.price }
    }

    fn catalog(meds: &[&Medicament]) -> HashMap<Uuid, Medicament> {
        meds.iter().map(|m| (m.id, (*m).clone())).collect()
    }

    #[test]
    fn total_is_sum_of_server_price_times_quantity() {
        let doliprane = med("Doliprane 1000", 2_500, 10);
        let smecta = med("Smecta", 4_200, 3);
        let lines = vec![line(&doliprane, 2), line(&smecta, 3)];

        let (priced, total) = price_lines(&lines, &catalog(&[&doliprane, &smecta])).unwrap();

        assert_eq!(total, 2_500 * 2 + 4_200 * 3);
        let recomputed: i64 = priced.iter().map(|l| l.unit_price * i64::from(l.quantity)).sum();
        assert_eq!(total, recomputed);
        assert_eq!(priced[0].name, "Doliprane 1000");
    }

    #[test]
    fn one_bad_line_rejects_the_whole_order() {
        let ok = med("Spasfon", 3_100, 50);
        let short = med("Augmentin", 9_900, 1);
        let lines = vec![line(&ok, 1), line(&short, 2)];

        let err = price_lines(&lines, &catalog(&[&ok, &short])).unwrap_err();
        assert_eq!(
            err,
            Rejection::OutOfStock { name: "Augmentin".into(), available: 1, requested: 2 }
        );
    }

    #[test]
    fn price_mismatch_is_rejected() {
        let m = med("Ventoline", 6_000, 5);
        let mut l = line(&m, 1);
        l.expected_price = 5_500;
        let err = price_lines(&[l], &catalog(&[&m])).unwrap_err();
        assert_eq!(err.reason(), "price_changed");
    }

    #[test]
    fn unknown_medicament_is_rejected() {
        let m = med("Efferalgan", 1_800, 5);
        let ghost = OrderLineRequest { medicament_id: Uuid::new_v4(), quantity: 1, expected_price: 1 };
        let err = price_lines(&[line(&m, 1), ghost.clone()], &catalog(&[&m])).unwrap_err();
        assert_eq!(err, Rejection::Missing(ghost.medicament_id));
    }

    #[test]
    fn exact_stock_is_enough() {
        let m = med("Gaviscon", 5_400, 4);
        let (_, total) = price_lines(&[line(&m, 4)], &catalog(&[&m])).unwrap();
        assert_eq!(total, 21_600);
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let m = med("Strepsils", 2_000, 10);
        let merged = merge_lines(&[line(&m, 1), line(&m, 2)]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 3);
    }

    #[test]
    fn merge_rejects_empty_and_non_positive_lines() {
        assert_eq!(merge_lines(&[]).unwrap_err(), Rejection::Empty);
        let m = med("Maalox", 3_000, 10);
        assert_eq!(merge_lines(&[line(&m, 0)]).unwrap_err(), Rejection::InvalidQuantity(m.id));

        let mut other_price = line(&m, 1);
        other_price.expected_price = 1;
        assert_eq!(
            merge_lines(&[line(&m, 1), other_price]).unwrap_err(),
            Rejection::ConflictingPrices(m.id)
        );
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let m = med("Coffret", i64::MAX / 2, i32::MAX);
        let err = price_lines(&[line(&m, 3)], &catalog(&[&m])).unwrap_err();
        assert_eq!(err, Rejection::TotalOverflow);
    }

    #[test]
    fn each_recipient_gets_one_order_notification() {
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let client = Uuid::new_v4();
        let admins = [Uuid::new_v4(), Uuid::new_v4()];
        let pharmacy = Pharmacy {
            id: Uuid::new_v4(),
            owner_id: owner,
            slug: "ibn-sina".into(),
            name: "Pharmacie Ibn Sina".into(),
            address: "3 rue de Marseille".into(),
            city: "Tunis".into(),
            phone: None,
            opening_hours: None,
            delivery_available: false,
            approval_status: "approuvee".into(),
            base_medicament: Some("pharmacie_ibn_sina".into()),
            garde_start: None,
            garde_end: None,
            created_at: now,
            updated_at: now,
        };
        let commande = Commande {
            id: Uuid::new_v4(),
            client_id: client,
            pharmacy_id: pharmacy.id,
            total: 1_000,
            delivery: false,
            delivery_address: None,
            note: None,
            status: "en_attente".into(),
            created_at: now,
            updated_at: now,
        };

        let out = new_order_notifications(&commande, &pharmacy, &admins);
        let recipients: Vec<Uuid> = out.iter().map(|n| n.recipient_id).collect();
        assert_eq!(recipients, vec![client, owner, admins[0], admins[1]]);
        assert!(out.iter().all(|n| n.commande_id == Some(commande.id)));
        assert_eq!(out[1].title, "Nouvelle commande");
    }

    #[test]
    fn orders_counter_label_is_bounded() {
        assert_eq!(fulfilment_label(true), "livraison");
        assert_eq!(fulfilment_label(false), "retrait");
        ORDERS_COUNTER.with_label_values(&[fulfilment_label(true)]).inc();
        assert!(ORDERS_COUNTER.with_label_values(&["livraison"]).get() >= 1.0);
    }
}

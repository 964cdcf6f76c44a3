mod common;

use std::time::Duration;

use pharmacie_api::{
    error::ApiError,
    models::{
        cart::{AddCartItemRequest, CheckoutRequest},
        commande::{CommandeStatus, CreateCommandeRequest, OrderLineRequest},
        user::UserRole,
    },
    services::{
        cart::CartService, catalog::CatalogService, commandes::CommandeService, notifications,
        push::register_push_token, stock_alerts,
    },
};
use uuid::Uuid;

fn line(id: Uuid, quantity: i32, expected_price: i64) -> OrderLineRequest {
    OrderLineRequest { medicament_id: id, quantity, expected_price }
}

// Client orders two medicaments: stock is decremented, the cart is gone and
// each recipient gets exactly one notification.
#[tokio::test]
async fn order_decrements_stock_and_notifies_each_recipient_once() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };
    let mut events = ctx.bus.receiver();

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let admin = common::create_user(&ctx.pool, UserRole::Admin).await?;
    register_push_token(&ctx.pool, client.user_id, "android", &format!("fcm-{}", client.user_id)).await?;
    register_push_token(&ctx.pool, owner.user_id, "ios", &format!("fcm-{}", owner.user_id)).await?;
    let doliprane = common::add_medicament(&ctx.pool, &catalog, "Doliprane 1000", 2_500, 10).await?;
    let smecta = common::add_medicament(&ctx.pool, &catalog, "Smecta", 4_200, 3).await?;

    CartService::add_item(
        &ctx.pool,
        client.user_id,
        &AddCartItemRequest { pharmacy_id: pharmacy.id, medicament_id: doliprane.id, quantity: 2 },
    )
    .await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(doliprane.id, 2, 2_500), line(smecta.id, 3, 4_200)],
        delivery: false,
        delivery_address: None,
        note: Some("Merci".into()),
    };
    let order = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &req).await?;

    assert_eq!(order.commande.total, 2_500 * 2 + 4_200 * 3);
    assert_eq!(order.commande.status, "en_attente");
    assert_eq!(order.items.len(), 2);
    assert_eq!(common::stock_of(&ctx.pool, &catalog, doliprane.id).await?, 8);
    assert_eq!(common::stock_of(&ctx.pool, &catalog, smecta.id).await?, 0);

    let carts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts WHERE user_id = $1 AND pharmacy_id = $2")
        .bind(client.user_id)
        .bind(pharmacy.id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(carts, 0);

    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT n.recipient_id, u.role FROM notifications n
         JOIN users u ON u.id = n.recipient_id
         WHERE n.commande_id = $1",
    )
    .bind(order.commande.id)
    .fetch_all(&ctx.pool)
    .await?;
    let recipients: Vec<Uuid> = rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(recipients.iter().filter(|id| **id == client.user_id).count(), 1);
    assert_eq!(recipients.iter().filter(|id| **id == owner.user_id).count(), 1);
    assert_eq!(recipients.iter().filter(|id| **id == admin.user_id).count(), 1);
    for (id, role) in &rows {
        if *id != client.user_id && *id != owner.user_id {
            assert_eq!(role, "admin");
            assert_eq!(recipients.iter().filter(|r| *r == id).count(), 1);
        }
    }

    // Push goes out after commit, on a spawned task.
    let pushed_to = |user: Uuid| ctx.push.sent.lock().unwrap().iter().filter(|(id, _)| *id == user).count();
    for _ in 0..50 {
        if pushed_to(client.user_id) > 0 && pushed_to(owner.user_id) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(pushed_to(client.user_id), 1);
    assert_eq!(pushed_to(owner.user_id), 1);
    // No token registered, no push.
    assert_eq!(pushed_to(admin.user_id), 0);

    // The pharmacy channel hears about the new order.
    let pharmacy_channel = format!("pharmacie:{}", pharmacy.id);
    let mut seen = false;
    while let Ok((channel, payload)) = events.try_recv() {
        if channel == pharmacy_channel && payload.contains("nouvelle_commande") {
            seen = true;
        }
    }
    assert!(seen);
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_rejects_and_changes_nothing() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (_, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let plenty = common::add_medicament(&ctx.pool, &catalog, "Spasfon", 3_100, 50).await?;
    let scarce = common::add_medicament(&ctx.pool, &catalog, "Augmentin", 9_900, 1).await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(plenty.id, 5, 3_100), line(scarce.id, 2, 9_900)],
        delivery: false,
        delivery_address: None,
        note: None,
    };
    let err = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &req)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    assert_eq!(common::stock_of(&ctx.pool, &catalog, plenty.id).await?, 50);
    assert_eq!(common::stock_of(&ctx.pool, &catalog, scarce.id).await?, 1);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commandes WHERE client_id = $1")
        .bind(client.user_id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(orders, 0);
    let notes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1")
        .bind(client.user_id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(notes, 0);
    Ok(())
}

#[tokio::test]
async fn stale_price_and_delivery_rules_are_enforced() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (_, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Ventoline", 6_000, 5).await?;

    let stale = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(med.id, 1, 5_500)],
        delivery: false,
        delivery_address: None,
        note: None,
    };
    let err = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    // This pharmacy does not deliver.
    let delivery = CreateCommandeRequest {
        items: vec![line(med.id, 1, 6_000)],
        delivery: true,
        delivery_address: Some("12 rue de Rome".into()),
        ..stale
    };
    let err = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &delivery)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn status_workflow_is_guarded_and_cancel_restores_stock() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, true).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let stranger = common::create_user(&ctx.pool, UserRole::Pharmacie).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Gaviscon", 5_400, 4).await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(med.id, 3, 5_400)],
        delivery: true,
        delivery_address: Some("4 avenue de France".into()),
        note: None,
    };
    let order = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &req).await?;
    let id = order.commande.id;
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 1);

    // Only the owning pharmacy drives the workflow.
    let err = CommandeService::update_status(&ctx.pool, &ctx.notifier, &client, id, CommandeStatus::EnPreparation)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    let err = CommandeService::update_status(&ctx.pool, &ctx.notifier, &stranger, id, CommandeStatus::EnPreparation)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // No skipping ahead.
    let err = CommandeService::update_status(&ctx.pool, &ctx.notifier, &owner, id, CommandeStatus::Livree)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let moved = CommandeService::update_status(&ctx.pool, &ctx.notifier, &owner, id, CommandeStatus::EnPreparation).await?;
    assert_eq!(moved.commande.status, "en_preparation");

    // The client can no longer cancel once preparation started.
    let err = CommandeService::update_status(&ctx.pool, &ctx.notifier, &client, id, CommandeStatus::Annulee)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let cancelled = CommandeService::update_status(&ctx.pool, &ctx.notifier, &owner, id, CommandeStatus::Annulee).await?;
    assert_eq!(cancelled.commande.status, "annulee");
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 4);

    // Terminal.
    let err = CommandeService::update_status(&ctx.pool, &ctx.notifier, &owner, id, CommandeStatus::EnAttente)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let status_notes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND kind = 'statut_commande'",
    )
    .bind(client.user_id)
    .fetch_one(&ctx.pool)
    .await?;
    assert_eq!(status_notes, 2);
    Ok(())
}

#[tokio::test]
async fn client_may_cancel_a_pending_order() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Strepsils", 2_000, 6).await?;

    CartService::add_item(
        &ctx.pool,
        client.user_id,
        &AddCartItemRequest { pharmacy_id: pharmacy.id, medicament_id: med.id, quantity: 2 },
    )
    .await?;
    let order = CartService::checkout(
        &ctx.pool,
        &ctx.notifier,
        client.user_id,
        pharmacy.id,
        &CheckoutRequest::default(),
    )
    .await?;
    assert_eq!(order.commande.total, 4_000);
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 4);

    let cancelled = CommandeService::update_status(
        &ctx.pool,
        &ctx.notifier,
        &client,
        order.commande.id,
        CommandeStatus::Annulee,
    )
    .await?;
    assert_eq!(cancelled.commande.status, "annulee");
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 6);

    // The pharmacy is told about the cancellation.
    let unread = notifications::unread_count(&ctx.pool, owner.user_id).await?;
    assert_eq!(unread, 2);
    Ok(())
}

#[tokio::test]
async fn orders_are_only_visible_to_their_parties() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let other_client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Maalox", 3_000, 10).await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(med.id, 1, 3_000)],
        delivery: false,
        delivery_address: None,
        note: None,
    };
    let order = CommandeService::create(&ctx.pool, &ctx.notifier, client.user_id, &req).await?;
    let id = order.commande.id;

    assert!(CommandeService::get(&ctx.pool, &client, id).await.is_ok());
    assert!(CommandeService::get(&ctx.pool, &owner, id).await.is_ok());
    assert!(matches!(
        CommandeService::get(&ctx.pool, &other_client, id).await,
        Err(ApiError::NotFound(_))
    ));

    let received = CommandeService::list_for_pharmacy(&ctx.pool, owner.user_id, &Default::default()).await?;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].items.len(), 1);
    assert!(CommandeService::list_for_client(&ctx.pool, other_client.user_id, &Default::default())
        .await?
        .is_empty());
    Ok(())
}

// Two clients race for the last box: exactly one order is accepted.
#[tokio::test]
async fn concurrent_orders_never_oversell() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (_, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let first = common::create_user(&ctx.pool, UserRole::Client).await?;
    let second = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Tamiflu", 12_000, 1).await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(med.id, 1, 12_000)],
        delivery: false,
        delivery_address: None,
        note: None,
    };
    let (a, b) = tokio::join!(
        CommandeService::create(&ctx.pool, &ctx.notifier, first.user_id, &req),
        CommandeService::create(&ctx.pool, &ctx.notifier, second.user_id, &req),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes.iter().filter(|r| matches!(r, Err(ApiError::BadRequest(_)))).count(),
        1
    );
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 0);
    Ok(())
}

// A stock adjustment waiting on an order's row lock adds to the stock the
// order left behind.
#[tokio::test]
async fn stock_adjustment_keeps_a_concurrent_order_decrement() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (_, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Voltarene", 4_800, 10).await?;
    let table = catalog.medicaments();

    let mut tx = ctx.pool.begin().await?;
    sqlx::query(&format!("SELECT stock FROM {table} WHERE id = $1 FOR UPDATE"))
        .bind(med.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("UPDATE {table} SET stock = stock - 2 WHERE id = $1"))
        .bind(med.id)
        .execute(&mut *tx)
        .await?;

    let adjust = {
        let id = med.id;
        let (pool, notifier, pharmacy, catalog) =
            (ctx.pool.clone(), ctx.notifier.clone(), pharmacy.clone(), catalog.clone());
        tokio::spawn(async move {
            CatalogService::adjust_stock(&pool, &notifier, &pharmacy, &catalog, id, 5).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.commit().await?;

    let adjusted = adjust.await??;
    assert_eq!(adjusted.stock, 13);
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 13);
    Ok(())
}

// Cancelling the order that emptied the shelf brings the stock back above
// zero, which is a restock for alert subscribers.
#[tokio::test]
async fn cancellation_restock_fires_stock_alerts() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let buyer = common::create_user(&ctx.pool, UserRole::Client).await?;
    let waiting = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Levothyrox", 3_300, 1).await?;

    let req = CreateCommandeRequest {
        pharmacy_id: pharmacy.id,
        items: vec![line(med.id, 1, 3_300)],
        delivery: false,
        delivery_address: None,
        note: None,
    };
    let order = CommandeService::create(&ctx.pool, &ctx.notifier, buyer.user_id, &req).await?;
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 0);

    stock_alerts::subscribe(&ctx.pool, waiting.user_id, pharmacy.id, med.id).await?;
    CommandeService::update_status(&ctx.pool, &ctx.notifier, &owner, order.commande.id, CommandeStatus::Annulee)
        .await?;
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 1);

    let alerts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND kind = 'stock_disponible'",
    )
    .bind(waiting.user_id)
    .fetch_one(&ctx.pool)
    .await?;
    assert_eq!(alerts, 1);
    assert!(stock_alerts::list_for_user(&ctx.pool, waiting.user_id).await?.is_empty());
    Ok(())
}

mod common;

use pharmacie_api::{
    db::tenant::TenantCatalog,
    error::ApiError,
    models::{
        commande::{CreateCommandeRequest, OrderLineRequest},
        medicament::UpdateMedicamentRequest,
        user::{RegisterClientRequest, RegisterPharmacyRequest, UserRole},
    },
    services::{
        admin::AdminService, auth::AuthService, catalog::CatalogService, commandes::CommandeService,
        notifications, stock_alerts,
    },
};
use uuid::Uuid;

const SECRET: &str = "integration-secret";

fn registration(tag: &str) -> RegisterPharmacyRequest {
    RegisterPharmacyRequest {
        email: format!("pharma-{tag}@test.local"),
        password: "motdepasse-solide".into(),
        first_name: "Amina".into(),
        last_name: "Ben Salah".into(),
        phone: None,
        pharmacy_name: format!("Pharmacie Centrale {tag}"),
        pharmacy_address: "3 place Pasteur".into(),
        city: "Sfax".into(),
        pharmacy_phone: Some("+216 74 000 000".into()),
        opening_hours: None,
        delivery_available: true,
    }
}

async fn demande_for(pool: &sqlx::PgPool, pharmacy_id: Uuid, kind: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query_scalar(
        "SELECT id FROM demandes WHERE pharmacy_id = $1 AND kind = $2 AND status = 'en_attente'",
    )
    .bind(pharmacy_id)
    .bind(kind)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn pharmacy_registration_approval_and_deletion() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };
    let admin = common::create_user(&ctx.pool, UserRole::Admin).await?;
    let tag = Uuid::new_v4().simple().to_string()[..8].to_string();
    let req = registration(&tag);

    let (owner, pharmacy) = AuthService::register_pharmacy(&ctx.pool, &ctx.notifier, None, &req).await?;
    assert_eq!(pharmacy.approval_status, "en_attente");
    assert!(pharmacy.base_medicament.is_none());
    assert!(TenantCatalog::for_pharmacy(&pharmacy).is_err());

    // The admin was told about the new pharmacy.
    assert!(notifications::unread_count(&ctx.pool, admin.user_id).await? >= 1);

    // Unverified accounts cannot log in.
    let err = AuthService::login(&ctx.pool, SECRET, 3600, &req.email, &req.password)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    AdminService::verify_user_email(&ctx.pool, owner.id).await?;
    let session = AuthService::login(&ctx.pool, SECRET, 3600, &req.email.to_uppercase(), &req.password).await?;
    assert_eq!(session.user.id, owner.id);

    let demande = demande_for(&ctx.pool, pharmacy.id, "creation_pharmacie").await?;
    AdminService::approve_demande(&ctx.pool, &ctx.notifier, None, admin.user_id, demande).await?;

    // Approving twice is a conflict.
    let err = AdminService::approve_demande(&ctx.pool, &ctx.notifier, None, admin.user_id, demande)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let (approved, catalog) = TenantCatalog::resolve(&ctx.pool, pharmacy.id).await?;
    assert_eq!(approved.approval_status, "approuvee");
    let med = common::add_medicament(&ctx.pool, &catalog, "Efferalgan", 1_800, 7).await?;
    assert_eq!(common::stock_of(&ctx.pool, &catalog, med.id).await?, 7);

    // Deletion cancels open orders and drops the catalog.
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let order = CommandeService::create(
        &ctx.pool,
        &ctx.notifier,
        client.user_id,
        &CreateCommandeRequest {
            pharmacy_id: pharmacy.id,
            items: vec![OrderLineRequest { medicament_id: med.id, quantity: 1, expected_price: 1_800 }],
            delivery: false,
            delivery_address: None,
            note: None,
        },
    )
    .await?;

    let owner_id = owner.id;
    pharmacie_api::services::pharmacies::PharmacyService::request_deletion(
        &ctx.pool,
        &ctx.notifier,
        owner_id,
        Some("Fermeture"),
    )
    .await?;
    let demande = demande_for(&ctx.pool, pharmacy.id, "suppression_compte").await?;
    AdminService::approve_demande(&ctx.pool, &ctx.notifier, None, admin.user_id, demande).await?;

    let status: String = sqlx::query_scalar("SELECT status FROM commandes WHERE id = $1")
        .bind(order.commande.id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(status, "annulee");

    let schema_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
    )
    .bind(catalog.schema())
    .fetch_one(&ctx.pool)
    .await?;
    assert!(!schema_exists);

    let err = AuthService::login(&ctx.pool, SECRET, 3600, &req.email, &req.password)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn rejected_creation_leaves_pharmacy_without_catalog() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };
    let admin = common::create_user(&ctx.pool, UserRole::Admin).await?;
    let tag = Uuid::new_v4().simple().to_string()[..8].to_string();

    let (owner, pharmacy) =
        AuthService::register_pharmacy(&ctx.pool, &ctx.notifier, None, &registration(&tag)).await?;
    let demande = demande_for(&ctx.pool, pharmacy.id, "creation_pharmacie").await?;
    let reviewed = AdminService::reject_demande(
        &ctx.pool,
        &ctx.notifier,
        None,
        admin.user_id,
        demande,
        Some("Licence illisible"),
    )
    .await?;
    assert_eq!(reviewed.status, "rejetee");
    assert_eq!(reviewed.admin_comment.as_deref(), Some("Licence illisible"));

    let err = TenantCatalog::resolve_owned(&ctx.pool, owner.id).await.unwrap_err();
    assert!(matches!(err, ApiError::CatalogUnavailable));
    Ok(())
}

#[tokio::test]
async fn restock_notifies_alert_subscribers_once() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (_, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Imodium", 3_600, 0).await?;
    let stocked = common::add_medicament(&ctx.pool, &catalog, "Daflon", 7_000, 2).await?;

    let err = stock_alerts::subscribe(&ctx.pool, client.user_id, pharmacy.id, stocked.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    stock_alerts::subscribe(&ctx.pool, client.user_id, pharmacy.id, med.id).await?;
    stock_alerts::subscribe(&ctx.pool, client.user_id, pharmacy.id, med.id).await?;
    assert_eq!(stock_alerts::list_for_user(&ctx.pool, client.user_id).await?.len(), 1);

    let restocked = CatalogService::adjust_stock(&ctx.pool, &ctx.notifier, &pharmacy, &catalog, med.id, 12).await?;
    assert_eq!(restocked.stock, 12);

    let alerts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND kind = 'stock_disponible'",
    )
    .bind(client.user_id)
    .fetch_one(&ctx.pool)
    .await?;
    assert_eq!(alerts, 1);
    assert!(stock_alerts::list_for_user(&ctx.pool, client.user_id).await?.is_empty());

    // A second restock on a consumed alert is silent.
    let req = UpdateMedicamentRequest { stock: Some(0), ..Default::default() };
    CatalogService::update(&ctx.pool, &ctx.notifier, &pharmacy, &catalog, med.id, &req).await?;
    CatalogService::adjust_stock(&ctx.pool, &ctx.notifier, &pharmacy, &catalog, med.id, 5).await?;
    let alerts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND kind = 'stock_disponible'",
    )
    .bind(client.user_id)
    .fetch_one(&ctx.pool)
    .await?;
    assert_eq!(alerts, 1);

    // Never below zero.
    let err = CatalogService::adjust_stock(&ctx.pool, &ctx.notifier, &pharmacy, &catalog, med.id, -6)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    Ok(())
}

#[tokio::test]
async fn notifications_are_private_and_mark_read_is_idempotent() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };

    let (owner, pharmacy, catalog) = common::approved_pharmacy(&ctx.pool, false).await?;
    let client = common::create_user(&ctx.pool, UserRole::Client).await?;
    let med = common::add_medicament(&ctx.pool, &catalog, "Rhinadvil", 5_100, 9).await?;
    CommandeService::create(
        &ctx.pool,
        &ctx.notifier,
        client.user_id,
        &CreateCommandeRequest {
            pharmacy_id: pharmacy.id,
            items: vec![OrderLineRequest { medicament_id: med.id, quantity: 2, expected_price: 5_100 }],
            delivery: false,
            delivery_address: None,
            note: None,
        },
    )
    .await?;

    let note_id: Uuid = sqlx::query_scalar("SELECT id FROM notifications WHERE recipient_id = $1")
        .bind(client.user_id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(notifications::unread_count(&ctx.pool, client.user_id).await?, 1);

    let first = notifications::mark_read(&ctx.pool, client.user_id, note_id).await?;
    let second = notifications::mark_read(&ctx.pool, client.user_id, note_id).await?;
    assert!(first.lu && second.lu);
    assert_eq!(notifications::unread_count(&ctx.pool, client.user_id).await?, 0);

    // Someone else's notification looks missing.
    let err = notifications::mark_read(&ctx.pool, owner.user_id, note_id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    let err = notifications::delete(&ctx.pool, owner.user_id, note_id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    assert_eq!(notifications::mark_all_read(&ctx.pool, owner.user_id).await?, 1);
    assert_eq!(notifications::mark_all_read(&ctx.pool, owner.user_id).await?, 0);
    notifications::delete(&ctx.pool, client.user_id, note_id).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_signups_with_one_email_conflict() -> anyhow::Result<()> {
    let Some(ctx) = common::setup().await? else { return Ok(()) };
    let tag = Uuid::new_v4().simple().to_string()[..8].to_string();
    let req = RegisterClientRequest {
        email: format!("client-{tag}@test.local"),
        password: "motdepasse-solide".into(),
        first_name: "Youssef".into(),
        last_name: "Trabelsi".into(),
        phone: None,
        address: None,
    };

    let (a, b) = tokio::join!(
        AuthService::register_client(&ctx.pool, None, &req),
        AuthService::register_client(&ctx.pool, None, &req),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes.iter().filter(|r| matches!(r, Err(ApiError::Conflict(_)))).count(),
        1
    );
    Ok(())
}

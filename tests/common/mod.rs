#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use pharmacie_api::{
    db::{
        self,
        tenant::{catalog_schema_name, provision_catalog_schema, TenantCatalog},
    },
    models::{
        auth::AuthenticatedUser,
        medicament::{CreateMedicamentRequest, Medicament},
        pharmacy::Pharmacy,
        user::UserRole,
    },
    services::{
        catalog::CatalogService,
        notifications::Notifier,
        push::{PushGateway, PushMessage, PushTarget},
        realtime::LocalEventBus,
    },
};
use sqlx::PgPool;
use uuid::Uuid;

/// Push gateway that keeps what it was asked to send.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(Uuid, String)>>,
}

impl PushGateway for RecordingGateway {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        message: &'a PushMessage,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.sent
            .lock()
            .unwrap()
            .push((target.user_id, message.title.clone()));
        Box::pin(async { Ok(()) })
    }
}

pub struct TestCtx {
    pub pool: PgPool,
    pub bus: Arc<LocalEventBus>,
    pub push: Arc<RecordingGateway>,
    pub notifier: Notifier,
}

/// Connects and migrates, or returns None when no database is configured.
pub async fn setup() -> anyhow::Result<Option<TestCtx>> {
    let database_url = match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
            return Ok(None);
        }
    };
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bus = Arc::new(LocalEventBus::default());
    let push = Arc::new(RecordingGateway::default());
    let notifier = Notifier::new(bus.clone(), push.clone());
    Ok(Some(TestCtx { pool, bus, push, notifier }))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}{}", &Uuid::new_v4().simple().to_string()[..10])
}

pub async fn create_user(pool: &PgPool, role: UserRole) -> anyhow::Result<AuthenticatedUser> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name, role, email_verified)
         VALUES ($1, 'x', 'Test', $2, $2, TRUE)
         RETURNING id",
    )
    .bind(format!("{}@test.local", unique("u")))
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;
    Ok(AuthenticatedUser { user_id: id, role })
}

/// Approved pharmacy with a provisioned, empty catalog.
pub async fn approved_pharmacy(
    pool: &PgPool,
    delivery: bool,
) -> anyhow::Result<(AuthenticatedUser, Pharmacy, TenantCatalog)> {
    let owner = create_user(pool, UserRole::Pharmacie).await?;
    let slug = unique("test-");
    let schema = catalog_schema_name(&slug);
    provision_catalog_schema(pool, &schema).await?;

    let pharmacy = sqlx::query_as::<_, Pharmacy>(
        "INSERT INTO pharmacies
            (owner_id, slug, name, address, city, delivery_available, approval_status, base_medicament)
         VALUES ($1, $2, $3, '1 rue du Test', 'Tunis', $4, 'approuvee', $5)
         RETURNING *",
    )
    .bind(owner.user_id)
    .bind(&slug)
    .bind(format!("Pharmacie {slug}"))
    .bind(delivery)
    .bind(&schema)
    .fetch_one(pool)
    .await?;
    let catalog = TenantCatalog::for_pharmacy(&pharmacy)?;
    Ok((owner, pharmacy, catalog))
}

pub async fn add_medicament(
    pool: &PgPool,
    catalog: &TenantCatalog,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Medicament> {
    let req = CreateMedicamentRequest {
        name: name.to_string(),
        description: None,
        category: None,
        price,
        stock,
        requires_prescription: false,
    };
    Ok(CatalogService::create(pool, catalog, &req).await?)
}

pub async fn stock_of(pool: &PgPool, catalog: &TenantCatalog, id: Uuid) -> anyhow::Result<i32> {
    let stock = sqlx::query_scalar(&format!("SELECT stock FROM {} WHERE id = $1", catalog.medicaments()))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(stock)
}

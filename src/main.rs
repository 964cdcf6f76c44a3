use std::sync::Arc;

use redis::Client as RedisClient;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pharmacie_api::{
    config::Config,
    db,
    middleware::auth::JwtSecret,
    routes,
    services::{
        auth::AuthService, cron::CronService, email::EmailService, metrics, notifications::Notifier,
        push::FcmGateway, realtime::RedisEventBus,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::provision_all_catalogs(&pool).await?;
    info!("Database connected, migrations applied, catalogs provisioned");

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        AuthService::bootstrap_admin(&pool, email, password).await?;
    }

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let events = Arc::new(RedisEventBus::new(redis_client, redis_conn.clone()));
    let push = Arc::new(FcmGateway::new(config.fcm_api_key.clone()));
    if config.fcm_api_key.is_none() {
        info!("FCM not configured, push notifications disabled");
    }
    let notifier = Notifier::new(events, push);

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured, email features disabled");
    }

    metrics::start(pool.clone());
    CronService::start(pool.clone(), config.notification_retention_days);

    let state = AppState {
        db: pool,
        redis: redis_conn,
        config: config.clone(),
        notifier,
        email,
    };

    let jwt_secret = JwtSecret(config.jwt_secret.clone());
    let app = routes::with_layers(routes::router(), &config.app_base_url, jwt_secret).with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("pharmacie API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// src/main.rs

use std::{net::SocketAddr, sync::Arc, time::Duration};

use quiz_platform::{
    config::Config,
    models::role::Permissions,
    repository::{PgSessionDirectory, PgTransactionManager},
    routes,
    services::quiz::QuizService,
    state::AppState,
    utils::hash::hash_password,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > DB_CONNECT_RETRIES {
                    tracing::error!(
                        "Failed to connect to database after {} retries: {}",
                        DB_CONNECT_RETRIES,
                        e
                    );
                    return Err(e.into());
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        quizzes: QuizService::new(Arc::new(PgTransactionManager::new(pool.clone()))),
        sessions: Arc::new(PgSessionDirectory::new(pool)),
    };

    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Creates the administrator account, holding a role with every permission bit,
/// when ADMIN_EMAIL, ADMIN_USERNAME and ADMIN_PASSWORD are all set.
async fn seed_admin_user(pool: &PgPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(username), Some(password)) = (
        &config.admin_email,
        &config.admin_username,
        &config.admin_password,
    ) else {
        return Ok(());
    };

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", username);
    let hashed_password = hash_password(password)?;

    let mut tx = pool.begin().await?;

    let (user_id,): (i32,) = sqlx::query_as(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(username)
    .bind(email)
    .bind(&hashed_password)
    .fetch_one(&mut *tx)
    .await?;

    let (role_id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO roles (name, permissions)
        VALUES ('admin', $1)
        ON CONFLICT (name) DO UPDATE SET permissions = EXCLUDED.permissions, updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(Permissions::ALL.bits())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}

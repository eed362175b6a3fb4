use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;

use agentteam_api::api::{build_router, AppState};
use agentteam_api::config::{init_tracing, Settings};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let settings = Settings::from_env().expect("Invalid configuration");
    init_tracing(&settings);

    tracing::info!(environment = %settings.app_env, "Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database ready");

    let addr: SocketAddr = format!("{}:{}", settings.api_host, settings.api_port)
        .parse()
        .expect("API_HOST/API_PORT do not form a socket address");

    let app = build_router(AppState::postgres(pool, settings));

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}

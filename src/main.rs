use std::sync::Arc;

use sandboard::provider::SandboxProvider;
use sandboard::provider::http::HttpSandboxProvider;
use sandboard::{db, routes, services, state};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let provider: Arc<dyn SandboxProvider> =
        Arc::new(HttpSandboxProvider::from_env().expect("sandbox provider init failed"));

    let state = state::AppState::new(pool, provider);

    // Load persisted projects and nodes into the live map before serving.
    services::persistence::hydrate_projects(&state)
        .await
        .expect("project hydration failed");

    // Spawn background node flush task.
    let _persistence = services::persistence::spawn_persistence_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sandboard listening");
    axum::serve(listener, app).await.expect("server failed");
}

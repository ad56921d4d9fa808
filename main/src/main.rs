use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{
        config::{get_config, AppConfig},
        job_signal::JobSignal,
    },
};
use generation_pipeline::{run_worker_loop, GenerationPipeline, WorkerSettings};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // Ensure db is initialized
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    // Create global storage manager
    let storage = StorageManager::new(&config).await?;

    // API and worker share one signal so submissions wake the worker without waiting for a poll.
    let signal = JobSignal::new();
    let api_state = ApiState::with_db(db.clone(), &config, signal.clone());
    let app = build_app(api_state, &storage, &config);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    let generation_pipeline = Arc::new(GenerationPipeline::new(
        db.clone(),
        openai_client,
        &config,
        storage,
    )?);

    info!("Starting worker process");
    if let Err(e) = run_worker_loop(
        db,
        generation_pipeline,
        signal,
        WorkerSettings::from_config(&config),
    )
    .await
    {
        error!("Worker process error: {}", e);
    }

    // Wait for the server task to finish (this likely won't be reached)
    if let Err(e) = server_handle.await {
        error!("Server task panicked: {:?}", e);
    }

    Ok(())
}

fn build_app(api_state: ApiState, storage: &StorageManager, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    if let Some(base) = storage.local_base_path() {
        if config.asset_base_url.starts_with('/') {
            app = app.nest_service(&config.asset_base_url, ServeDir::new(base));
        }
    }

    app.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use common::utils::config::StorageKind;
    use std::path::Path;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str, data_dir: &Path) -> AppConfig {
        AppConfig {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            data_dir: data_dir.to_string_lossy().into_owned(),
            http_port: 0,
            openai_base_url: "https://example.com".into(),
            asset_base_url: "/assets".into(),
            render_api_url: "https://render.example.com".into(),
            storage: StorageKind::Local,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let data_dir = std::env::temp_dir().join(format!("generation_smoke_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&data_dir)
            .await
            .expect("failed to create temp data directory");

        let config = smoke_test_config(namespace, &database, &data_dir);
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("failed to initialize database");

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));
        let storage = StorageManager::new(&config)
            .await
            .expect("failed to build storage manager");

        GenerationPipeline::new(db.clone(), openai_client, &config, storage.clone())
            .expect("pipeline builds from config");

        let api_state = ApiState::with_db(db, &config, JobSignal::new());
        let app = build_app(api_state, &storage, &config);

        for probe in ["/api/v1/live", "/api/v1/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(probe).body(Body::empty()).expect("request"))
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::OK, "{probe}");
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/video-jobs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"tenant_id":"tenant-1","brief":"Sneaker on a city street","niche":"apparel"}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("submit response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["status"], "pending");

        tokio::fs::remove_dir_all(&data_dir).await.ok();
    }
}

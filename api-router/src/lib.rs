use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    probes::{live, ready},
    video_jobs::{cancel_job, get_job, submit_job},
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

const SUBMISSION_MAX_BODY_BYTES: usize = 64 * 1024;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let protected = Router::new()
        .route(
            "/video-jobs",
            post(submit_job).layer(DefaultBodyLimit::max(SUBMISSION_MAX_BODY_BYTES)),
        )
        .route("/video-jobs/{id}", get(get_job).delete(cancel_job))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use common::{
        storage::{db::SurrealDbClient, types::video_job::VideoJob},
        utils::{config::AppConfig, job_signal::JobSignal},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn test_state(api_key: Option<&str>) -> ApiState {
        let db = SurrealDbClient::memory("api_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        db.ensure_initialized().await.expect("indexes");

        let config = AppConfig {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        };
        ApiState::with_db(Arc::new(db), &config, JobSignal::new())
    }

    fn app(state: &ApiState) -> Router {
        Router::new()
            .nest("/api/v1", api_routes_v1(state))
            .with_state(state.clone())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    fn submit_request(body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/video-jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn valid_submission() -> Value {
        json!({
            "tenant_id": "tenant-1",
            "product_image_ref": "https://img.example.com/serum.png",
            "brief": "Serum bottle on a marble vanity",
            "niche": "cosmetics",
            "variation_count": 2
        })
    }

    #[tokio::test]
    async fn submit_then_fetch_job() {
        let state = test_state(None).await;

        let (status, body) = send(app(&state), submit_request(&valid_submission())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        let job_id = body["job_id"].as_str().expect("job id").to_string();

        let (status, body) = send(
            app(&state),
            Request::builder()
                .uri(format!("/api/v1/video-jobs/{job_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_id"], job_id.as_str());
        assert_eq!(body["stage"], "PENDING");
        assert_eq!(body["variation_count"], 2);
        assert_eq!(body["candidates"], json!([]));
    }

    #[tokio::test]
    async fn invalid_submission_is_bad_request() {
        let state = test_state(None).await;

        let mut too_many = valid_submission();
        too_many["variation_count"] = json!(9);
        let (status, body) = send(app(&state), submit_request(&too_many)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, _) = send(app(&state), submit_request(&json!({ "tenant_id": "t" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let state = test_state(None).await;

        let (status, body) = send(
            app(&state),
            Request::builder()
                .uri("/api/v1/video-jobs/does-not-exist")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn cancel_active_then_terminal_job() {
        let state = test_state(None).await;
        let (_, body) = send(app(&state), submit_request(&valid_submission())).await;
        let job_id = body["job_id"].as_str().expect("job id").to_string();

        let cancel = || {
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/v1/video-jobs/{job_id}"))
                .body(Body::empty())
                .expect("request")
        };

        let (status, body) = send(app(&state), cancel()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["cancel_requested"], true);

        let mut job = state
            .db
            .get_item::<VideoJob>(&job_id)
            .await
            .expect("fetch")
            .expect("job");
        job.mark_failed("job cancelled by request", &state.db)
            .await
            .expect("fail job");

        let (status, _) = send(app(&state), cancel()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn configured_key_guards_job_routes_but_not_probes() {
        let state = test_state(Some("secret")).await;

        let (status, _) = send(app(&state), submit_request(&valid_submission())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = submit_request(&valid_submission());
        request
            .headers_mut()
            .insert("X-API-Key", "secret".parse().expect("header"));
        let (status, _) = send(app(&state), request).await;
        assert_eq!(status, StatusCode::OK);

        let mut request = submit_request(&valid_submission());
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer wrong".parse().expect("header"),
        );
        let (status, _) = send(app(&state), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        for probe in ["/api/v1/live", "/api/v1/ready"] {
            let (status, body) = send(
                app(&state),
                Request::builder().uri(probe).body(Body::empty()).expect("request"),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{probe}");
            assert_eq!(body["status"], "ok");
        }
    }
}

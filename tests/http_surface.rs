use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use sea_orm::SqlxPostgresConnector;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use storefront_api::{
    routes::create_app, services::payment_service::StripeClient, state::AppState,
};

// Lazy pool so the router can be exercised without a database; none of the
// requests below reach a handler that touches it.
fn state() -> AppState {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://postgres@127.0.0.1:1/unused")
        .unwrap();
    let orm = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
    AppState {
        pool,
        orm,
        stripe: StripeClient::new(None, "http://127.0.0.1:1"),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unknown_path_returns_json_not_found() {
    let app = create_app(state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Not found" })
    );
}

// A wrong method on a known path gets the same 404 body as an unknown path,
// not a bare 405.
#[tokio::test]
async fn wrong_method_on_known_path_returns_json_not_found() {
    let app = create_app(state());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/payments/intent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Not found" })
    );
}

#[tokio::test]
async fn health_answers_on_get() {
    let app = create_app(state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
}

use axum::http::StatusCode;
use axum::{Json, Router, routing::post};

use storefront_api::{
    dto::payments::CreateIntentRequest, error::RelayError,
    services::payment_service::StripeClient,
};

fn request(amount: Option<i64>) -> CreateIntentRequest {
    serde_json::from_value(serde_json::json!({
        "amount": amount,
        "currency": "usd",
        "email": "buyer@example.com",
        "fullName": "Buyer Example",
        "userId": "u-1"
    }))
    .unwrap()
}

// Amount validation happens before any outbound call, so these pass with an
// unroutable processor address.
#[tokio::test]
async fn non_positive_amount_is_rejected_before_any_processor_call() {
    let client = StripeClient::new(Some("sk_test_dummy".into()), "http://127.0.0.1:1");

    for amount in [None, Some(0), Some(-500)] {
        let err = client.create_intent(&request(amount)).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidAmount));
        assert_eq!(err.to_string(), "Invalid amount");
    }
}

#[tokio::test]
async fn missing_credential_is_a_server_error() {
    let client = StripeClient::new(None, "http://127.0.0.1:1");

    let err = client.create_intent(&request(Some(1500))).await.unwrap_err();
    assert!(matches!(err, RelayError::MissingCredential));
}

// Stub processor that checks the forwarded form body and answers with a
// canned intent.
async fn spawn_stub_processor() -> String {
    let app = Router::new().route(
        "/v1/payment_intents",
        post(|body: String| async move {
            if !body.contains("amount=1500") || !body.contains("currency=usd") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": { "message": "missing amount or currency" }
                    })),
                );
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": "pi_stub_1",
                    "client_secret": "pi_stub_1_secret_abc"
                })),
            )
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn valid_amount_and_credential_yield_an_intent() {
    let base = spawn_stub_processor().await;
    let client = StripeClient::new(Some("sk_test_dummy".into()), base);

    let intent = client.create_intent(&request(Some(1500))).await.unwrap();
    assert_eq!(intent.id, "pi_stub_1");
    assert!(!intent.client_secret.is_empty());
}

#[tokio::test]
async fn unreachable_processor_surfaces_as_processor_error() {
    // Port 9 (discard) is closed; the connect error must come back as a
    // processor failure, not a panic.
    let client = StripeClient::new(Some("sk_test_dummy".into()), "http://127.0.0.1:9");

    let err = client.create_intent(&request(Some(1500))).await.unwrap_err();
    assert!(matches!(err, RelayError::Processor(_)));
}

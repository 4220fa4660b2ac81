use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::{CreateIntentRequest, CreateIntentResponse},
    error::RelayError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/intent", post(create_intent))
}

#[utoipa::path(
    post,
    path = "/api/payments/intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Create a card payment intent", body = CreateIntentResponse),
        (status = 400, description = "Invalid amount"),
        (status = 500, description = "Missing credential or processor failure"),
    ),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, RelayError> {
    let resp = state.stripe.create_intent(&payload).await?;
    Ok(Json(resp))
}

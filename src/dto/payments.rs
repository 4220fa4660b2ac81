use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of the relay's create-intent endpoint. Amount is in the smallest
/// currency unit; the optional fields are forwarded as processor metadata.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub client_secret: String,
    pub id: String,
}

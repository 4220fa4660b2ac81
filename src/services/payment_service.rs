use serde::Deserialize;

use crate::{
    config::AppConfig,
    dto::payments::{CreateIntentRequest, CreateIntentResponse},
    error::RelayError,
};

/// Thin relay onto a Stripe-style processor. Validation happens before any
/// outbound call so a bad amount never reaches the processor.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: Option<String>,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: Option<StripeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            api_base: api_base.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.stripe_secret_key.clone(), config.stripe_api_base.clone())
    }

    pub async fn create_intent(
        &self,
        payload: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, RelayError> {
        let amount = payload
            .amount
            .filter(|a| *a > 0)
            .ok_or(RelayError::InvalidAmount)?;
        let secret = self
            .secret_key
            .as_deref()
            .ok_or(RelayError::MissingCredential)?;

        let currency = payload.currency.as_deref().unwrap_or("usd");
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), amount.to_string()),
            ("currency".into(), currency.to_string()),
            ("payment_method_types[]".into(), "card".into()),
        ];
        if let Some(email) = payload.email.as_deref() {
            form.push(("metadata[email]".into(), email.to_string()));
        }
        if let Some(full_name) = payload.full_name.as_deref() {
            form.push(("metadata[fullName]".into(), full_name.to_string()));
        }
        if let Some(user_id) = payload.user_id.as_deref() {
            form.push(("metadata[userId]".into(), user_id.to_string()));
        }

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(secret)
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::Processor(e.to_string()))?;

        if !response.status().is_success() {
            let body: StripeErrorBody = response
                .json()
                .await
                .unwrap_or(StripeErrorBody { error: None });
            let message = body
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment processor rejected the request".to_string());
            return Err(RelayError::Processor(message));
        }

        let intent: StripeIntent = response
            .json()
            .await
            .map_err(|e| RelayError::Processor(e.to_string()))?;

        Ok(CreateIntentResponse {
            client_secret: intent.client_secret,
            id: intent.id,
        })
    }
}

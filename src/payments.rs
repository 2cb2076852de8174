//! Payment provider seam, Stripe client and price arithmetic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ontario HST.
pub const DEFAULT_TAX_RATE: f64 = 0.13;
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Structured failure from the provider, shown to the customer as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    pub code: String,
    pub message: String,
}

impl PaymentError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl PaymentIntent {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// Key under which the provider deduplicates intent creation, so a retried
/// checkout for the same appointment and amount reuses the first intent.
pub fn checkout_idempotency_key(appointment_id: &str, amount_cents: i64) -> String {
    format!("checkout-{}-{}", appointment_id, amount_cents)
}

#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Create an intent, or return the one already created under
    /// `idempotency_key`.
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        appointment_id: &str,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn confirm(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<PaymentIntent, PaymentError>;
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Price plus tax, each part rounded to cents.
pub fn calculate_total(price: f64, tax_rate: f64) -> PriceBreakdown {
    let subtotal = round_cents(price);
    let tax = round_cents(price * tax_rate);
    PriceBreakdown {
        subtotal,
        tax,
        total: round_cents(subtotal + tax),
    }
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

/// Stripe PaymentIntents over the form-encoded REST API.
pub struct StripeProvider {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeProvider {
    pub fn new(secret_key: &str) -> Self {
        Self::with_api_base(secret_key, STRIPE_API_BASE)
    }

    pub fn with_api_base(secret_key: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<StripeReply, PaymentError> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self.client.post(&url).bearer_auth(&self.secret_key).form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.execute(request).await
    }

    async fn retrieve(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents/{}", self.api_base, intent_id);
        let request = self.client.get(&url).bearer_auth(&self.secret_key);
        Ok(self.execute(request).await?.intent)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<StripeReply, PaymentError> {
        let resp = request
            .send()
            .await
            .map_err(|e| PaymentError::new("network_error", format!("Stripe request failed: {}", e)))?;

        let status = resp.status();
        let replayed = resp
            .headers()
            .get("Idempotent-Replayed")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &text));
        }

        let intent = serde_json::from_str(&text).map_err(|e| {
            PaymentError::new("invalid_response", format!("Failed to parse Stripe response: {}", e))
        })?;
        Ok(StripeReply { intent, replayed })
    }
}

struct StripeReply {
    intent: PaymentIntent,
    /// Stripe answered from its idempotency cache.
    replayed: bool,
}

/// Map a Stripe error body (`{"error": {"code", "message", "type"}}`).
fn parse_error(status: u16, body: &str) -> PaymentError {
    #[derive(Deserialize)]
    struct Envelope {
        error: StripeError,
    }
    #[derive(Deserialize)]
    struct StripeError {
        code: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope { error }) => PaymentError {
            code: error
                .code
                .or(error.kind)
                .unwrap_or_else(|| "payment_failed".to_string()),
            message: error
                .message
                .unwrap_or_else(|| format!("Stripe returned HTTP {}", status)),
        },
        Err(_) => PaymentError::new("http_error", format!("Stripe returned HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        appointment_id: &str,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        if amount_cents <= 0 {
            return Err(PaymentError::new("invalid_amount", "Amount must be positive"));
        }
        let form = [
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[appointmentId]", appointment_id.to_string()),
        ];
        let reply = self
            .post("/v1/payment_intents", &form, Some(idempotency_key))
            .await?;
        if reply.replayed {
            // A replay carries the intent as first created; read its current state.
            log::info!("Reusing payment intent {} for {}", reply.intent.id, appointment_id);
            return self.retrieve(&reply.intent.id).await;
        }
        log::info!("Created payment intent {} for {}", reply.intent.id, appointment_id);
        Ok(reply.intent)
    }

    async fn confirm(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [("payment_method", payment_method.to_string())];
        let path = format!("/v1/payment_intents/{}/confirm", intent_id);
        let intent = self.post(&path, &form, None).await?.intent;
        log::info!("Payment intent {} is {}", intent.id, intent.status);
        Ok(intent)
    }
}

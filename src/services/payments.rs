// Payment service: card checkout through the provider and payment history.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::SalonError;
use crate::payments::{
    calculate_total, checkout_idempotency_key, to_minor_units, PaymentError, PaymentProvider,
};
use crate::record::{LifecycleStatus, Payment, PaymentStatus, Record};
use crate::repository::Repository;
use crate::stats::{count_by_status, sum_field};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    /// Sum over completed payments.
    pub total_amount: f64,
    pub count: usize,
    pub by_status: BTreeMap<String, usize>,
}

pub struct PaymentService {
    repo: Arc<Repository<Payment>>,
    provider: Option<Arc<dyn PaymentProvider>>,
    currency: String,
    tax_rate: f64,
}

impl PaymentService {
    pub fn new(
        repo: Arc<Repository<Payment>>,
        provider: Option<Arc<dyn PaymentProvider>>,
        currency: &str,
        tax_rate: f64,
    ) -> Self {
        Self {
            repo,
            provider,
            currency: currency.to_string(),
            tax_rate,
        }
    }

    pub fn repository(&self) -> &Arc<Repository<Payment>> {
        &self.repo
    }

    /// Charge the appointment's price plus tax and record a completed payment.
    ///
    /// Intent creation is keyed by appointment and amount, so calling this
    /// again after a failure reuses the same intent and never confirms it
    /// twice. Once the card is charged, a failed save is reported as
    /// `PaymentUnrecorded` rather than a retryable error.
    pub async fn checkout(
        &self,
        appointment: &Record,
        payment_method: &str,
    ) -> Result<Record, SalonError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            SalonError::Configuration("No payment provider configured".to_string())
        })?;
        let price = appointment.get_f64("price").ok_or_else(|| {
            SalonError::ValidationFailed(format!("appointment {} has no price", appointment.id))
        })?;
        let already_paid = self.repo.find(|p| {
            p.get_str("appointmentId") == Some(appointment.id.as_str())
                && p.status == PaymentStatus::Completed.as_str()
        });
        if let Some(existing) = already_paid.first() {
            return Err(SalonError::ValidationFailed(format!(
                "appointment {} is already paid ({})",
                appointment.id, existing.id
            )));
        }

        let breakdown = calculate_total(price, self.tax_rate);
        let amount_cents = to_minor_units(breakdown.total);
        let intent = provider
            .create_intent(
                amount_cents,
                &self.currency,
                &appointment.id,
                &checkout_idempotency_key(&appointment.id, amount_cents),
            )
            .await?;
        let confirmed = if intent.succeeded() {
            log::info!("Intent {} already charged, recording only", intent.id);
            intent
        } else {
            provider.confirm(&intent.id, payment_method).await?
        };
        if !confirmed.succeeded() {
            return Err(PaymentError {
                code: "payment_incomplete".to_string(),
                message: format!("Payment is {}", confirmed.status),
            }
            .into());
        }

        let customer_name = [appointment.get_str("firstName"), appointment.get_str("lastName")]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let record = Record::new(PaymentStatus::Completed.as_str())
            .with("appointmentId", appointment.id.as_str())
            .with("customerEmail", appointment.get_str("email").unwrap_or_default())
            .with("customerName", customer_name)
            .with("service", appointment.get_str("service").unwrap_or_default())
            .with("subtotal", breakdown.subtotal)
            .with("tax", breakdown.tax)
            .with("amount", breakdown.total)
            .with("currency", self.currency.as_str())
            .with("method", "stripe")
            .with("paymentIntentId", confirmed.id.as_str());

        let payment = match self.recorded(record).await {
            Ok(payment) => payment,
            Err(e) => {
                log::error!(
                    "Payment {} for {} charged but not saved: {}",
                    confirmed.id,
                    appointment.id,
                    e
                );
                return Err(SalonError::PaymentUnrecorded {
                    payment_intent_id: confirmed.id,
                    reason: e.to_string(),
                });
            }
        };
        log::info!("Checkout complete for {} as {}", appointment.id, payment.id);
        Ok(payment)
    }

    /// Save a payment recorded outside checkout (cash, e-transfer).
    pub async fn record(&self, payment: Record) -> Result<Record, SalonError> {
        self.recorded(payment).await
    }

    async fn recorded(&self, mut payment: Record) -> Result<Record, SalonError> {
        payment.id = self.repo.save(payment.clone()).await?;
        Ok(payment)
    }

    /// Reload, then return the payments made under `email`.
    pub async fn for_customer(&self, email: &str) -> Vec<Record> {
        self.repo.load().await;
        self.repo.find(|p| {
            p.get_str("customerEmail")
                .map(|e| e.eq_ignore_ascii_case(email.trim()))
                .unwrap_or(false)
        })
    }

    pub fn stats(&self) -> PaymentStats {
        let payments = self.repo.records();
        let completed: &dyn Fn(&Record) -> bool =
            &|p| p.status == PaymentStatus::Completed.as_str();
        PaymentStats {
            total_amount: sum_field(&payments, "amount", Some(completed)),
            count: payments.len(),
            by_status: count_by_status::<PaymentStatus>(&payments),
        }
    }
}

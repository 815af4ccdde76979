//! Flutterwave adapter.
//!
//! Webhooks carry a `verif-hash` header holding the account's configured
//! secret hash verbatim; verification is a constant-time comparison
//! against the configured value. Amounts arrive in major currency units
//! and are normalized to minor units.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::{
    build_http_client, constant_time_eq, map_request_error, PaymentEvent, PaymentGateway,
    PaymentInit, PaymentOutcome,
};
use crate::entities::order;
use crate::errors::ServiceError;

const PROVIDER: &str = "flutterwave";
const BASE_URL: &str = "https://api.flutterwave.com/v3";
const SIGNATURE_HEADER: &str = "verif-hash";

pub struct FlutterwaveGateway {
    secret_key: String,
    webhook_hash: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: u64,
    tx_ref: String,
    amount: f64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[allow(dead_code)]
    event: String,
    data: TransactionData,
}

impl FlutterwaveGateway {
    pub fn new(
        secret_key: String,
        webhook_hash: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            secret_key,
            webhook_hash,
            client: build_http_client(timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn verify_signature(&self, headers: &HeaderMap) -> Result<(), ServiceError> {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::SignatureInvalid(PROVIDER.to_string()))?;

        if constant_time_eq(provided.as_bytes(), self.webhook_hash.as_bytes()) {
            Ok(())
        } else {
            Err(ServiceError::SignatureInvalid(PROVIDER.to_string()))
        }
    }

    fn normalize_outcome(status: &str) -> PaymentOutcome {
        match status {
            "successful" => PaymentOutcome::Succeeded,
            "failed" => PaymentOutcome::Failed,
            _ => PaymentOutcome::Pending,
        }
    }

    fn to_minor_units(amount: f64) -> i64 {
        (amount * 100.0).round() as i64
    }

    fn event_from_data(data: TransactionData) -> PaymentEvent {
        PaymentEvent {
            provider: PROVIDER.to_string(),
            event_id: data.id.to_string(),
            order_reference: data.tx_ref,
            amount: Self::to_minor_units(data.amount),
            currency: data.currency,
            outcome: Self::normalize_outcome(&data.status),
            signature_verified: true,
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn initialize_transaction(
        &self,
        order: &order::Model,
        customer_email: &str,
    ) -> Result<PaymentInit, ServiceError> {
        let reference = format!("{}-{}", order.order_number, Uuid::new_v4().simple());
        // Flutterwave expects major units.
        let amount = order.total as f64 / 100.0;

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "tx_ref": reference,
                "amount": amount,
                "currency": order.currency,
                "customer": { "email": customer_email },
            }))
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let body: ApiResponse<PaymentLink> = response
            .json()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let data = match (body.status.as_str(), body.data) {
            ("success", Some(data)) => data,
            (_, _) => {
                return Err(ServiceError::GatewayError(format!(
                    "flutterwave initialize failed: {}",
                    body.message.unwrap_or_else(|| "no message".into())
                )))
            }
        };

        Ok(PaymentInit {
            reference,
            authorization_url: data.link,
        })
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, reference: &str) -> Result<PaymentEvent, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/transactions/verify_by_reference",
                self.base_url
            ))
            .query(&[("tx_ref", reference)])
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let body: ApiResponse<TransactionData> = response
            .json()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let data = match (body.status.as_str(), body.data) {
            ("success", Some(data)) => data,
            (_, _) => {
                return Err(ServiceError::GatewayError(format!(
                    "flutterwave verify failed: {}",
                    body.message.unwrap_or_else(|| "no message".into())
                )))
            }
        };

        Ok(Self::event_from_data(data))
    }

    fn parse_webhook(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<PaymentEvent, ServiceError> {
        self.verify_signature(headers)?;

        let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
            ServiceError::BadRequest(format!("malformed flutterwave webhook: {}", e))
        })?;

        Ok(Self::event_from_data(payload.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const HASH: &str = "flw-webhook-hash";

    fn gateway() -> FlutterwaveGateway {
        FlutterwaveGateway::new(
            "FLWSECK_TEST-x".to_string(),
            HASH.to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn webhook_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "charge.completed",
            "data": {
                "id": 1408443,
                "tx_ref": "ORD-5678-ref",
                "amount": 500.0,
                "currency": "NGN",
                "status": "successful"
            }
        }))
        .unwrap()
    }

    #[test]
    fn parses_webhook_with_valid_hash() {
        let body = webhook_body();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HASH.parse().unwrap());

        let event = gateway().parse_webhook(&body, &headers).unwrap();
        assert_eq!(event.provider, "flutterwave");
        assert_eq!(event.event_id, "1408443");
        assert_eq!(event.order_reference, "ORD-5678-ref");
        // 500.00 major units -> 50000 minor units.
        assert_eq!(event.amount, 50000);
        assert_eq!(event.outcome, PaymentOutcome::Succeeded);
    }

    #[test]
    fn rejects_wrong_hash() {
        let body = webhook_body();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "wrong-hash".parse().unwrap());

        let err = gateway().parse_webhook(&body, &headers).unwrap_err();
        assert_matches!(err, ServiceError::SignatureInvalid(_));
    }

    #[test]
    fn rejects_absent_hash() {
        let err = gateway()
            .parse_webhook(&webhook_body(), &HeaderMap::new())
            .unwrap_err();
        assert_matches!(err, ServiceError::SignatureInvalid(_));
    }

    #[test]
    fn normalizes_failed_status() {
        assert_eq!(
            FlutterwaveGateway::normalize_outcome("failed"),
            PaymentOutcome::Failed
        );
        assert_eq!(
            FlutterwaveGateway::normalize_outcome("pending"),
            PaymentOutcome::Pending
        );
    }
}

//! Paystack adapter.
//!
//! Webhooks carry an `x-paystack-signature` header: hex HMAC-SHA512 of the
//! raw request body keyed with the account secret. Amounts are already in
//! minor currency units (kobo).

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;
use tracing::instrument;
use uuid::Uuid;

use super::{
    build_http_client, map_request_error, PaymentEvent, PaymentGateway, PaymentInit,
    PaymentOutcome,
};
use crate::entities::order;
use crate::errors::ServiceError;

const PROVIDER: &str = "paystack";
const BASE_URL: &str = "https://api.paystack.co";
const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

pub struct PaystackGateway {
    secret_key: String,
    webhook_secret: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    status: bool,
    message: Option<String>,
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    message: Option<String>,
    data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: u64,
    status: String,
    reference: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    data: TransactionData,
}

impl PaystackGateway {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            secret_key,
            webhook_secret,
            client: build_http_client(timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn verify_signature(&self, body: &[u8], headers: &HeaderMap) -> Result<(), ServiceError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::SignatureInvalid(PROVIDER.to_string()))?;

        let signature_bytes = hex::decode(signature)
            .map_err(|_| ServiceError::SignatureInvalid(PROVIDER.to_string()))?;

        let mut mac = HmacSha512::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| ServiceError::SignatureInvalid(PROVIDER.to_string()))?;
        mac.update(body);

        // Mac::verify_slice is constant-time.
        mac.verify_slice(&signature_bytes)
            .map_err(|_| ServiceError::SignatureInvalid(PROVIDER.to_string()))
    }

    fn normalize_outcome(event: &str, status: &str) -> PaymentOutcome {
        match (event, status) {
            ("charge.success", _) => PaymentOutcome::Succeeded,
            (_, "success") => PaymentOutcome::Succeeded,
            ("charge.failed", _) | (_, "failed") => PaymentOutcome::Failed,
            _ => PaymentOutcome::Pending,
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
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

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email": customer_email,
                "amount": order.total,
                "currency": order.currency,
                "reference": reference,
            }))
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let body: InitializeResponse = response
            .json()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let data = match (body.status, body.data) {
            (true, Some(data)) => data,
            (_, _) => {
                return Err(ServiceError::GatewayError(format!(
                    "paystack initialize failed: {}",
                    body.message.unwrap_or_else(|| "no message".into())
                )))
            }
        };

        Ok(PaymentInit {
            reference: data.reference,
            authorization_url: data.authorization_url,
        })
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, reference: &str) -> Result<PaymentEvent, ServiceError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        let data = match (body.status, body.data) {
            (true, Some(data)) => data,
            (_, _) => {
                return Err(ServiceError::GatewayError(format!(
                    "paystack verify failed: {}",
                    body.message.unwrap_or_else(|| "no message".into())
                )))
            }
        };

        Ok(PaymentEvent {
            provider: PROVIDER.to_string(),
            event_id: data.id.to_string(),
            order_reference: data.reference,
            amount: data.amount,
            currency: data.currency,
            outcome: Self::normalize_outcome("", &data.status),
            signature_verified: true,
            received_at: Utc::now(),
        })
    }

    fn parse_webhook(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<PaymentEvent, ServiceError> {
        self.verify_signature(body, headers)?;

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("malformed paystack webhook: {}", e)))?;

        Ok(PaymentEvent {
            provider: PROVIDER.to_string(),
            event_id: payload.data.id.to_string(),
            order_reference: payload.data.reference,
            amount: payload.data.amount,
            currency: payload.data.currency,
            outcome: Self::normalize_outcome(&payload.event, &payload.data.status),
            signature_verified: true,
            received_at: Utc::now(),
        })
    }
}

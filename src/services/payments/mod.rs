//! Payment gateway adapters.
//!
//! One adapter per provider behind the `PaymentGateway` trait; OrderLedger
//! and the webhook handlers only ever see the trait and the normalized
//! `PaymentEvent`. Signature verification always runs against the raw
//! request body with a constant-time comparison and fails closed.

pub mod flutterwave;
pub mod paystack;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::config::AppConfig;
use crate::entities::order;
use crate::errors::ServiceError;

pub use flutterwave::FlutterwaveGateway;
pub use paystack::PaystackGateway;

/// Provider-neutral payment outcome vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Pending,
}

/// A verified, normalized provider notification.
///
/// `event_id` is the provider's own identifier for the delivery (its
/// transaction id), never derived from mutable payload fields; together
/// with `provider` it is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub provider: String,
    pub event_id: String,
    pub order_reference: String,
    pub amount: i64,
    pub currency: String,
    pub outcome: PaymentOutcome,
    pub signature_verified: bool,
    pub received_at: DateTime<Utc>,
}

/// Result of initializing a provider transaction for a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    /// Our reference for the transaction, stored on the order exactly once.
    pub reference: String,
    /// Provider-hosted page the customer is redirected to.
    pub authorization_url: String,
}

/// Capability set every payment provider implements.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stable provider identifier stored on orders ("paystack", ...).
    fn provider(&self) -> &'static str;

    /// Creates a provider transaction for the order and returns the
    /// redirect target. Network round trip with an explicit timeout;
    /// never called while holding stock locks.
    async fn initialize_transaction(
        &self,
        order: &order::Model,
        customer_email: &str,
    ) -> Result<PaymentInit, ServiceError>;

    /// Re-verifies a transaction by reference against the provider API.
    /// Used by reconciliation when a confirmation webhook is delayed or lost.
    async fn verify_transaction(&self, reference: &str) -> Result<PaymentEvent, ServiceError>;

    /// Verifies the webhook signature over the raw body and normalizes the
    /// payload. Fails closed with `SignatureInvalid`; payload fields are
    /// never trusted before the signature checks out.
    fn parse_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<PaymentEvent, ServiceError>;
}

/// Maps provider ids to adapters. Adding a provider means implementing
/// `PaymentGateway` and registering here; OrderLedger is untouched.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider().to_string(), gateway);
    }

    pub fn get(&self, provider: &str) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways
            .get(provider)
            .cloned()
            .ok_or_else(|| ServiceError::BadRequest(format!("unknown payment gateway '{}'", provider)))
    }

    /// Builds adapters for every gateway enabled in config. Secrets have
    /// already been checked at startup by `AppConfig::validate_gateways`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let timeout = Duration::from_secs(cfg.gateway_timeout_secs);
        let mut registry = Self::new();

        for provider in &cfg.enabled_gateways {
            match provider.as_str() {
                "paystack" => {
                    let secret_key = cfg.paystack.secret_key.clone().ok_or_else(|| {
                        ServiceError::InternalError("paystack secret key missing".into())
                    })?;
                    let webhook_secret = cfg
                        .paystack
                        .webhook_secret()
                        .ok_or_else(|| {
                            ServiceError::InternalError("paystack webhook secret missing".into())
                        })?
                        .to_string();
                    registry.register(Arc::new(PaystackGateway::new(
                        secret_key,
                        webhook_secret,
                        timeout,
                    )?));
                }
                "flutterwave" => {
                    let secret_key = cfg.flutterwave.secret_key.clone().ok_or_else(|| {
                        ServiceError::InternalError("flutterwave secret key missing".into())
                    })?;
                    let webhook_secret = cfg
                        .flutterwave
                        .webhook_secret()
                        .ok_or_else(|| {
                            ServiceError::InternalError("flutterwave webhook secret missing".into())
                        })?
                        .to_string();
                    registry.register(Arc::new(FlutterwaveGateway::new(
                        secret_key,
                        webhook_secret,
                        timeout,
                    )?));
                }
                other => {
                    return Err(ServiceError::InternalError(format!(
                        "unknown payment gateway '{}' in config",
                        other
                    )))
                }
            }
        }

        Ok(registry)
    }
}

/// Byte-wise constant-time comparison for signature checks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::InternalError(format!("failed to build http client: {}", e)))
}

pub(crate) fn map_request_error(provider: &str, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::GatewayTimeout(provider.to_string())
    } else {
        ServiceError::GatewayError(format!("{}: {}", provider, e))
    }
}

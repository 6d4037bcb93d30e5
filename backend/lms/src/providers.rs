//! Mobile-money provider gateway.
//!
//! In sandbox mode every initiation is accepted with a simulated
//! transaction id. Live MVola requests go through the merchant-pay API;
//! the final outcome always arrives later through the provider webhook.
//!
//! Initiation is never retried: a repeated push would ask the customer to
//! pay twice.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Config, ProviderConfig};
use crate::models::MobileProvider;

const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// What the provider answered to a payment push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiation {
    Accepted { transaction_id: String },
    Declined { reason: String },
}

/// One payment push to a customer's wallet.
#[derive(Debug, Clone)]
pub struct PushRequest<'a> {
    pub payment_id: &'a str,
    pub amount: i64,
    pub phone: &'a str,
    pub ec_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct MerchantPayResponse {
    #[serde(rename = "serverCorrelationId")]
    server_correlation_id: Option<String>,
}

#[derive(Clone)]
pub struct Gateway {
    client: Client,
    config: Arc<Config>,
}

impl Gateway {
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Gateway with a default HTTP client using the configured timeout.
    pub fn from_config(config: Arc<Config>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self::new(client, config))
    }

    pub fn settings(&self, provider: MobileProvider) -> &ProviderConfig {
        match provider {
            MobileProvider::Mvola => &self.config.mvola,
            MobileProvider::OrangeMoney => &self.config.orange_money,
            MobileProvider::AirtelMoney => &self.config.airtel_money,
        }
    }

    /// Ask the provider to debit the customer.
    pub async fn initiate(&self, provider: MobileProvider, req: &PushRequest<'_>) -> Initiation {
        let settings = self.settings(provider);
        if settings.sandbox {
            let transaction_id = sandbox_reference(provider);
            info!(
                "Sandbox {} push for payment {} accepted as {transaction_id}",
                provider.label(),
                req.payment_id
            );
            return Initiation::Accepted { transaction_id };
        }

        match provider {
            MobileProvider::Mvola => self.mvola_merchant_pay(settings, req).await,
            MobileProvider::OrangeMoney => Initiation::Accepted {
                transaction_id: format!("ORANGE-{}", req.payment_id),
            },
            MobileProvider::AirtelMoney => Initiation::Accepted {
                transaction_id: format!("AIRTEL-{}", req.payment_id),
            },
        }
    }

    async fn mvola_merchant_pay(&self, settings: &ProviderConfig, req: &PushRequest<'_>) -> Initiation {
        let url = format!(
            "{}/mvola/mm/transactions/type/merchantpay/1.0.0/",
            settings.api_url.trim_end_matches('/')
        );
        let callback_url = format!(
            "{}/api/method/payment.mvola_callback",
            self.config.public_url.trim_end_matches('/')
        );
        let payload = json!({
            "amount": req.amount.to_string(),
            "currency": "Ar",
            "descriptionText": format!("Paiement EC - {}", req.ec_id),
            "requestingOrganisationTransactionReference": req.payment_id,
            "requestDate": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            "debitParty": [{ "key": "msisdn", "value": req.phone }],
            "creditParty": [{ "key": "msisdn", "value": settings.merchant_id }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&settings.api_key)
            .header("Version", "1.0")
            .header("X-CorrelationID", req.payment_id)
            .header("X-Callback-URL", callback_url)
            .json(&payload)
            .send()
            .await;

        let resp = match response {
            Ok(resp) => resp,
            Err(e) => {
                warn!("MVola request for payment {} failed: {e}", req.payment_id);
                return Initiation::Declined {
                    reason: e.to_string(),
                };
            }
        };

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            warn!("MVola rejected payment {}: {status}", req.payment_id);
            return Initiation::Declined {
                reason: format!("MVola error: {}", status.as_u16()),
            };
        }

        match resp.json::<MerchantPayResponse>().await {
            Ok(MerchantPayResponse {
                server_correlation_id: Some(id),
            }) => {
                debug!("MVola accepted payment {} as {id}", req.payment_id);
                Initiation::Accepted { transaction_id: id }
            }
            Ok(_) => Initiation::Declined {
                reason: "MVola error: missing serverCorrelationId".to_string(),
            },
            Err(e) => Initiation::Declined {
                reason: format!("MVola error: {e}"),
            },
        }
    }
}

/// Simulated transaction id such as `MVOLA-7Q2K9D0XBZ1M`.
pub fn sandbox_reference(provider: MobileProvider) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("{}-{suffix}", provider.code().to_uppercase())
}

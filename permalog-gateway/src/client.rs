//! HTTP gateway client
//!
//! reqwest-backed implementation of [`Gateway`] against an Arweave-style
//! gateway: `POST /tx` for signed transaction bodies, `GET /tx/{id}/status`
//! for seeding status, `GET /wallet/{address}/balance` and
//! `GET /price/{bytes}` for balance and price quotes.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::{Gateway, TxStatus};

/// HTTP client for the storage-network gateway
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

/// Status body returned for confirmed transactions
#[derive(Debug, Deserialize)]
struct StatusResponse {
    block_height: u64,
    #[serde(default)]
    number_of_confirmations: u32,
}

impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    async fn get_text(&self, path: &str) -> GatewayResult<String> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn post_transaction(&self, id: &str, body: &[u8]) -> GatewayResult<()> {
        debug!(tx = %id, size = body.len(), "Posting transaction");

        let response = self
            .client
            .post(self.url("/tx"))
            .header("Content-Type", "application/octet-stream")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(GatewayError::PaymentRequired(text));
        }
        Err(GatewayError::Http {
            status: status.as_u16(),
            body: text,
        })
    }

    async fn tx_status(&self, id: &str) -> GatewayResult<TxStatus> {
        let response = self
            .client
            .get(self.url(&format!("/tx/{}/status", id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(TxStatus::NotFound),
            StatusCode::ACCEPTED => Ok(TxStatus::Pending),
            status if status.is_success() => {
                let body: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Response(e.to_string()))?;
                Ok(TxStatus::Confirmed {
                    block_height: body.block_height,
                    confirmations: body.number_of_confirmations.max(1),
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn balance_winston(&self, address: &str) -> GatewayResult<u128> {
        let body = self
            .get_text(&format!("/wallet/{}/balance", address))
            .await?;
        body.trim()
            .parse()
            .map_err(|_| GatewayError::Response(format!("bad balance body: {}", body)))
    }

    async fn price_winston(&self, bytes: usize) -> GatewayResult<u128> {
        let body = self.get_text(&format!("/price/{}", bytes)).await?;
        body.trim()
            .parse()
            .map_err(|_| GatewayError::Response(format!("bad price body: {}", body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let client = GatewayClient::new(GatewayConfig {
            url: "http://localhost:1984/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.url("/tx"), "http://localhost:1984/tx");
    }

    #[test]
    fn test_status_body_parses() {
        let body: StatusResponse = serde_json::from_str(
            r#"{"block_height": 100, "block_indep_hash": "abc", "number_of_confirmations": 3}"#,
        )
        .unwrap();
        assert_eq!(body.block_height, 100);
        assert_eq!(body.number_of_confirmations, 3);
    }
}

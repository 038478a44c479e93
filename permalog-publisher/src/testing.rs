//! Test doubles shared by the publisher test modules.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use permalog_gateway::{Gateway, GatewayError, GatewayResult, TxStatus};

/// Scripted gateway: per-id failure counts, payment gating and status
/// overrides, plus attempt accounting for retry assertions.
#[derive(Default)]
pub struct MockGateway {
    /// Successfully posted transaction ids, in arrival order
    pub posted: Mutex<Vec<String>>,
    /// id -> failures to serve before accepting (u32::MAX = always fail)
    pub fail_posts: Mutex<HashMap<String, u32>>,
    /// Reject every post with 402
    pub payment_required: Mutex<bool>,
    /// Always fail posts whose body contains this marker
    pub fail_body_marker: Mutex<Option<Vec<u8>>>,
    /// Status overrides; unposted unknown ids report NotFound
    pub statuses: Mutex<HashMap<String, TxStatus>>,
    /// id -> post attempts observed
    pub attempts: Mutex<HashMap<String, u32>>,
    pub balance: Mutex<u128>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            balance: Mutex::new(u128::MAX),
            ..Default::default()
        }
    }

    pub fn with_balance(balance: u128) -> Self {
        Self {
            balance: Mutex::new(balance),
            ..Default::default()
        }
    }

    /// Fail the next `failures` posts of `id`.
    pub fn fail_next(&self, id: &str, failures: u32) {
        self.fail_posts
            .lock()
            .unwrap()
            .insert(id.to_string(), failures);
    }

    /// Fail every post whose body contains `marker`.
    pub fn fail_bodies_containing(&self, marker: &[u8]) {
        *self.fail_body_marker.lock().unwrap() = Some(marker.to_vec());
    }

    pub fn set_status(&self, id: &str, status: TxStatus) {
        self.statuses.lock().unwrap().insert(id.to_string(), status);
    }

    pub fn posted_ids(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn post_transaction(&self, id: &str, body: &[u8]) -> GatewayResult<()> {
        *self.attempts.lock().unwrap().entry(id.to_string()).or_insert(0) += 1;

        if *self.payment_required.lock().unwrap() {
            return Err(GatewayError::PaymentRequired("insufficient funds".to_string()));
        }

        if let Some(marker) = self.fail_body_marker.lock().unwrap().as_deref() {
            if body.windows(marker.len()).any(|w| w == marker) {
                return Err(GatewayError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
        }

        let mut fail_posts = self.fail_posts.lock().unwrap();
        if let Some(remaining) = fail_posts.get_mut(id) {
            if *remaining == u32::MAX {
                return Err(GatewayError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
        }
        drop(fail_posts);

        self.posted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn tx_status(&self, id: &str) -> GatewayResult<TxStatus> {
        if let Some(status) = self.statuses.lock().unwrap().get(id) {
            return Ok(*status);
        }
        if self.posted.lock().unwrap().iter().any(|p| p == id) {
            return Ok(TxStatus::Pending);
        }
        Ok(TxStatus::NotFound)
    }

    async fn balance_winston(&self, _address: &str) -> GatewayResult<u128> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn price_winston(&self, bytes: usize) -> GatewayResult<u128> {
        Ok(bytes as u128)
    }
}

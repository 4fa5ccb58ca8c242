//! Prepaid wallet gateway.

use crate::error::TelecomError;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Whether the customer's wallet covers `amount` for the next period.
    async fn check_balance(
        &self,
        customer_id: &str,
        subscription_id: Uuid,
        amount: Decimal,
    ) -> Result<bool, TelecomError>;
}

/// Behaviour of [`MockWallet`], parsed from `WALLET_MODE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalletMode {
    Approve,
    Decline,
    /// Approve with the given probability.
    Random(f64),
}

impl FromStr for WalletMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(WalletMode::Approve),
            "decline" => Ok(WalletMode::Decline),
            other => {
                let p = other
                    .strip_prefix("random:")
                    .ok_or_else(|| format!("unknown wallet mode '{}'", s))?
                    .parse::<f64>()
                    .map_err(|e| format!("invalid wallet probability in '{}': {}", s, e))?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(format!("wallet probability out of range in '{}'", s));
                }
                Ok(WalletMode::Random(p))
            }
        }
    }
}

/// Stand-in for a real wallet integration.
pub struct MockWallet {
    mode: WalletMode,
    checks: AtomicU64,
}

impl MockWallet {
    pub fn new(mode: WalletMode) -> Self {
        Self {
            mode,
            checks: AtomicU64::new(0),
        }
    }

    pub fn check_count(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletGateway for MockWallet {
    async fn check_balance(
        &self,
        customer_id: &str,
        subscription_id: Uuid,
        amount: Decimal,
    ) -> Result<bool, TelecomError> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        let approved = match self.mode {
            WalletMode::Approve => true,
            WalletMode::Decline => false,
            WalletMode::Random(p) => rand::thread_rng().gen_bool(p),
        };

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription_id,
            amount = %amount,
            approved = approved,
            "[MOCK] Wallet balance checked"
        );

        Ok(approved)
    }
}

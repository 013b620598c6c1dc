use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a payment intent with the provider
    async fn create_intent(&self, booking_id: Uuid, amount: i64, currency: &str) -> LedgerResult<PaymentIntent>;
}

/// What a gateway notification asks the ledger to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVerdict {
    Settled,
    Failed,
    Informational,
}

/// Payment gateway HTTP notification (order id = booking id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub transaction_id: String,
    pub transaction_status: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
}

impl PaymentNotification {
    /// hex(SHA-512(order_id ‖ status_code ‖ gross_amount ‖ server_key))
    pub fn expected_signature(&self, server_key: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(self.order_id.as_bytes());
        hasher.update(self.status_code.as_bytes());
        hasher.update(self.gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, server_key: &str) -> bool {
        let expected = self.expected_signature(server_key);
        let given = self.signature_key.to_ascii_lowercase();
        constant_time_eq(expected.as_bytes(), given.as_bytes())
    }

    pub fn verdict(&self) -> GatewayVerdict {
        match self.transaction_status.as_str() {
            "settlement" | "capture" => GatewayVerdict::Settled,
            "deny" | "cancel" | "expire" | "failure" => GatewayVerdict::Failed,
            _ => GatewayVerdict::Informational,
        }
    }

    pub fn booking_id(&self) -> LedgerResult<Uuid> {
        Uuid::parse_str(&self.order_id)
            .map_err(|_| LedgerError::Validation(format!("order_id '{}' is not a booking id", self.order_id)))
    }

    /// Gateways send decimal strings such as "20000.00"; fractions of the
    /// smallest unit are rejected.
    pub fn amount(&self) -> LedgerResult<i64> {
        let invalid = || LedgerError::Validation(format!("invalid gross_amount '{}'", self.gross_amount));
        let (whole, fraction) = self
            .gross_amount
            .split_once('.')
            .unwrap_or((self.gross_amount.as_str(), ""));
        if !fraction.chars().all(|c| c == '0') {
            return Err(invalid());
        }
        let amount: i64 = whole.parse().map_err(|_| invalid())?;
        if amount <= 0 {
            return Err(invalid());
        }
        Ok(amount)
    }
}

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

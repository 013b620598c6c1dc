use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parkir_core::{Account, Caller, LedgerError, LedgerResult, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// Signs and checks bearer session credentials (HS256).
#[derive(Clone)]
pub struct SessionIssuer {
    secret: String,
    expiration_seconds: u64,
}

impl SessionIssuer {
    pub fn new(secret: impl Into<String>, expiration_seconds: u64) -> Self {
        Self {
            secret: secret.into(),
            expiration_seconds,
        }
    }

    pub fn issue(&self, account: &Account) -> LedgerResult<String> {
        let expires_at = i64::try_from(self.expiration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| LedgerError::Validation("session lifetime is out of range".into()))?;
        let claims = SessionClaims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role.to_string(),
            exp: expires_at.timestamp().max(0) as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| LedgerError::Storage(format!("session encoding failed: {}", e)))
    }

    /// Every failure collapses into the same generic auth error.
    pub fn verify(&self, token: &str) -> LedgerResult<Caller> {
        let token_data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| LedgerError::unauthenticated())?;

        let claims = token_data.claims;
        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| LedgerError::unauthenticated())?;
        let role: Role = claims.role.parse().map_err(|_| LedgerError::unauthenticated())?;
        Ok(Caller::new(account_id, role))
    }
}

//! Gate passes: HS256-signed, time-boxed, single-use tokens bound to one booking.
//!
//! Signature and expiry checks are stateless. Single use is enforced by the
//! caller through `QrTokenRepository::mark_used` on the token's `jti`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parkir_core::{LedgerError, LedgerResult, QrKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QrClaims {
    pub jti: Uuid,
    pub booking_id: Uuid,
    pub kind: QrKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedQr {
    pub token: String,
    pub kind: QrKind,
    pub booking_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct QrGateAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl QrGateAuthority {
    /// Fails `Validation` when the window does not fit a timestamp.
    pub fn new(secret: &str, validity_seconds: u64) -> LedgerResult<Self> {
        let validity = i64::try_from(validity_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                LedgerError::Validation(format!("QR validity of {} seconds is out of range", validity_seconds))
            })?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validity,
        })
    }

    pub fn mint(&self, booking_id: Uuid, kind: QrKind, now: DateTime<Utc>) -> LedgerResult<IssuedQr> {
        let expires_at = now
            .checked_add_signed(self.validity)
            .ok_or_else(|| LedgerError::Validation("QR expiry is out of range".into()))?;
        let claims = QrClaims {
            jti: Uuid::new_v4(),
            booking_id,
            kind,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| LedgerError::Storage(format!("QR signing failed: {}", e)))?;

        Ok(IssuedQr {
            token,
            kind,
            booking_id,
            issued_at: now,
            expires_at,
        })
    }

    /// Checks signature, expiry against `now`, and kind.
    pub fn verify(&self, token: &str, expected: QrKind, now: DateTime<Utc>) -> LedgerResult<QrClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the caller's clock, without leeway.
        validation.validate_exp = false;

        let claims = decode::<QrClaims>(token, &self.decoding, &validation)
            .map_err(|_| LedgerError::TokenInvalid("malformed or forged token".into()))?
            .claims;

        if now.timestamp() >= claims.exp {
            let expired_at = Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| claims.exp.to_string());
            return Err(LedgerError::TokenInvalid(format!("token expired at {}", expired_at)));
        }

        if claims.kind != expected {
            return Err(LedgerError::TokenInvalid(format!(
                "{} token presented at {} gate",
                claims.kind, expected
            )));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_verifies_until_expiry() {
        let authority = QrGateAuthority::new("qr-secret", 60).unwrap();
        let booking_id = Uuid::new_v4();
        let now = Utc::now();

        let issued = authority.mint(booking_id, QrKind::Entry, now).unwrap();
        assert_eq!(issued.expires_at - issued.issued_at, Duration::seconds(60));

        let claims = authority.verify(&issued.token, QrKind::Entry, now + Duration::seconds(59)).unwrap();
        assert_eq!(claims.booking_id, booking_id);

        let err = authority
            .verify(&issued.token, QrKind::Entry, now + Duration::seconds(60))
            .unwrap_err();
        assert!(matches!(err, LedgerError::TokenInvalid(_)));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let authority = QrGateAuthority::new("qr-secret", 60).unwrap();
        let issued = authority.mint(Uuid::new_v4(), QrKind::Exit, Utc::now()).unwrap();
        assert!(matches!(
            authority.verify(&issued.token, QrKind::Entry, Utc::now()),
            Err(LedgerError::TokenInvalid(_))
        ));
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let minter = QrGateAuthority::new("a", 60).unwrap();
        let issued = minter.mint(Uuid::new_v4(), QrKind::Entry, Utc::now()).unwrap();
        let other = QrGateAuthority::new("b", 60).unwrap();
        assert!(other.verify(&issued.token, QrKind::Entry, Utc::now()).is_err());
    }

    #[test]
    fn out_of_range_validity_is_rejected_without_panicking() {
        assert!(matches!(QrGateAuthority::new("qr-secret", u64::MAX), Err(LedgerError::Validation(_))));
        assert!(matches!(
            QrGateAuthority::new("qr-secret", i64::MAX as u64),
            Err(LedgerError::Validation(_))
        ));

        // Representable as a duration but not as an expiry date.
        let authority = QrGateAuthority::new("qr-secret", 1_000_000_000_000_000).unwrap();
        assert!(matches!(
            authority.mint(Uuid::new_v4(), QrKind::Entry, Utc::now()),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn every_mint_has_a_fresh_id() {
        let authority = QrGateAuthority::new("qr-secret", 60).unwrap();
        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let a = authority.mint(booking_id, QrKind::Entry, now).unwrap();
        let b = authority.mint(booking_id, QrKind::Entry, now).unwrap();
        assert_ne!(a.token, b.token);
    }
}

use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Stable provider-side account id.
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Verify a third-party ID token and extract the identity it asserts
    async fn verify_id_token(&self, id_token: &str) -> LedgerResult<VerifiedIdentity>;
}

/// Development resolver: trusts tokens of the form `email` or `email|name`.
/// Only wired when `auth.identity = "mock"`.
pub struct MockIdentityResolver;

#[async_trait]
impl IdentityResolver for MockIdentityResolver {
    async fn verify_id_token(&self, id_token: &str) -> LedgerResult<VerifiedIdentity> {
        let (email, name) = match id_token.split_once('|') {
            Some((email, name)) => (email.trim(), name.trim()),
            None => (id_token.trim(), ""),
        };

        if email.is_empty() || !email.contains('@') {
            return Err(LedgerError::Auth("identity token rejected".to_string()));
        }

        tracing::info!("Resolved external identity for {}", parkir_shared::pii::Masked(email));

        let name = if name.is_empty() {
            email.split('@').next().unwrap_or(email).to_string()
        } else {
            name.to_string()
        };

        let email = email.to_ascii_lowercase();
        Ok(VerifiedIdentity {
            subject: format!("mock:{}", email),
            email,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_resolver_reads_email_and_name() {
        let identity = MockIdentityResolver.verify_id_token("Dewi@Mail.com|Dewi Lestari").await.unwrap();
        assert_eq!(identity.email, "dewi@mail.com");
        assert_eq!(identity.name, "Dewi Lestari");
        assert_eq!(identity.subject, "mock:dewi@mail.com");

        let identity = MockIdentityResolver.verify_id_token("andi@mail.com").await.unwrap();
        assert_eq!(identity.name, "andi");

        assert!(MockIdentityResolver.verify_id_token("garbage").await.is_err());
    }
}

//! Google ID token verification.
//!
//! Tokens are RS256 JWTs signed with one of Google's rotating keys. The
//! published key set is cached by `kid` and refetched when a token names a
//! key the cache has not seen, at most once per `MIN_REFRESH_INTERVAL`.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parkir_core::identity::{IdentityResolver, VerifiedIdentity};
use parkir_core::{LedgerError, LedgerResult};
use parkir_shared::pii::Masked;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the provider's public signing keys come from.
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn fetch(&self) -> LedgerResult<JwkSet>;
}

/// Fetches the key set over HTTPS.
pub struct HttpJwks {
    client: reqwest::Client,
    url: String,
}

impl HttpJwks {
    pub fn new(url: impl Into<String>) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Upstream(format!("identity key client: {}", e)))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl JwksSource for HttpJwks {
    async fn fetch(&self) -> LedgerResult<JwkSet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::Upstream(format!("identity keys unavailable: {}", e)))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| LedgerError::Upstream(format!("identity keys unreadable: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

pub struct GoogleIdentityResolver {
    client_id: String,
    source: Arc<dyn JwksSource>,
    cache: RwLock<KeyCache>,
}

impl GoogleIdentityResolver {
    /// `client_id` is the OAuth client the tokens must be issued for.
    pub fn new(client_id: impl Into<String>, source: Arc<dyn JwksSource>) -> Self {
        Self {
            client_id: client_id.into(),
            source,
            cache: RwLock::new(KeyCache::default()),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation
    }

    async fn key_for(&self, kid: &str) -> LedgerResult<Option<DecodingKey>> {
        if let Some(key) = self.cache.read().await.keys.get(kid) {
            return Ok(Some(key.clone()));
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(key) = cache.keys.get(kid) {
            return Ok(Some(key.clone()));
        }
        if cache.fetched_at.is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL) {
            return Ok(None);
        }

        let set = self.source.fetch().await?;
        cache.keys = set
            .keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                match DecodingKey::from_jwk(jwk) {
                    Ok(key) => Some((kid, key)),
                    Err(err) => {
                        warn!(kid = %kid, "Skipping unusable identity key: {}", err);
                        None
                    }
                }
            })
            .collect();
        cache.fetched_at = Some(Instant::now());
        info!(keys = cache.keys.len(), "Refreshed identity signing keys");

        Ok(cache.keys.get(kid).cloned())
    }
}

fn rejected() -> LedgerError {
    LedgerError::Auth("identity token rejected".to_string())
}

#[async_trait]
impl IdentityResolver for GoogleIdentityResolver {
    async fn verify_id_token(&self, id_token: &str) -> LedgerResult<VerifiedIdentity> {
        if self.client_id.is_empty() {
            warn!("External sign-in attempted but no identity client id is configured");
            return Err(rejected());
        }

        let header = decode_header(id_token).map_err(|_| rejected())?;
        if header.alg != Algorithm::RS256 {
            return Err(rejected());
        }
        let kid = header.kid.ok_or_else(rejected)?;
        let key = self.key_for(&kid).await?.ok_or_else(|| {
            debug!(kid = %kid, "ID token signed with an unknown key");
            rejected()
        })?;

        let claims = decode::<GoogleClaims>(id_token, &key, &self.validation())
            .map_err(|e| {
                debug!("ID token failed verification: {}", e);
                rejected()
            })?
            .claims;

        let email = match claims.email {
            Some(email) if claims.email_verified && email.contains('@') => email.trim().to_ascii_lowercase(),
            _ => return Err(rejected()),
        };
        info!("Verified external identity for {}", Masked(&email));

        let name = claims
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

        Ok(VerifiedIdentity {
            subject: claims.sub,
            email,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CLIENT_ID: &str = "parkir-web.apps.googleusercontent.com";
    const SIGNING_KEY: &str = include_str!("../tests/fixtures/identity_signing_key.pem");
    const JWKS: &str = include_str!("../tests/fixtures/identity_jwks.json");

    struct FixedJwks {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl JwksSource for FixedJwks {
        async fn fetch(&self) -> LedgerResult<JwkSet> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_str(JWKS).unwrap())
        }
    }

    fn resolver() -> (GoogleIdentityResolver, Arc<FixedJwks>) {
        let source = Arc::new(FixedJwks {
            fetches: AtomicUsize::new(0),
        });
        (GoogleIdentityResolver::new(CLIENT_ID, source.clone()), source)
    }

    fn id_token(kid: &str, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn claims() -> serde_json::Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": "110248495921238986420",
            "email": "Dewi@Mail.com",
            "email_verified": true,
            "name": "Dewi Lestari",
            "exp": Utc::now().timestamp() + 600,
        })
    }

    #[tokio::test]
    async fn accepts_a_properly_signed_token() {
        let (resolver, _) = resolver();
        let identity = resolver.verify_id_token(&id_token("test-key-1", claims())).await.unwrap();
        assert_eq!(identity.subject, "110248495921238986420");
        assert_eq!(identity.email, "dewi@mail.com");
        assert_eq!(identity.name, "Dewi Lestari");
    }

    #[tokio::test]
    async fn rejects_wrong_audience_issuer_or_expired() {
        let (resolver, _) = resolver();

        let mut other_client = claims();
        other_client["aud"] = json!("someone-else.apps.googleusercontent.com");
        let mut other_issuer = claims();
        other_issuer["iss"] = json!("https://evil.example.com");
        let mut expired = claims();
        expired["exp"] = json!(Utc::now().timestamp() - 3600);
        let mut unverified = claims();
        unverified["email_verified"] = json!(false);

        for claims in [other_client, other_issuer, expired, unverified] {
            let err = resolver.verify_id_token(&id_token("test-key-1", claims)).await.unwrap_err();
            assert!(matches!(err, LedgerError::Auth(_)));
        }
    }

    #[tokio::test]
    async fn bare_emails_and_tampered_tokens_are_rejected() {
        let (resolver, _) = resolver();
        assert!(matches!(
            resolver.verify_id_token("owner@lot.id").await,
            Err(LedgerError::Auth(_))
        ));

        let token = id_token("test-key-1", claims());
        let (head, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let mut forged = claims();
        forged["email"] = json!("owner@lot.id");
        let forged_payload = id_token("test-key-1", forged);
        let forged_body = forged_payload.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", head, forged_body, signature);
        assert!(matches!(resolver.verify_id_token(&spliced).await, Err(LedgerError::Auth(_))));
    }

    #[tokio::test]
    async fn unknown_key_ids_do_not_hammer_the_key_endpoint() {
        let (resolver, source) = resolver();
        for _ in 0..3 {
            let err = resolver.verify_id_token(&id_token("rotated-away", claims())).await.unwrap_err();
            assert!(matches!(err, LedgerError::Auth(_)));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        resolver.verify_id_token(&id_token("test-key-1", claims())).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_client_id_rejects_everything() {
        let source = Arc::new(FixedJwks {
            fetches: AtomicUsize::new(0),
        });
        let resolver = GoogleIdentityResolver::new("", source);
        assert!(resolver.verify_id_token(&id_token("test-key-1", claims())).await.is_err());
    }
}

use crate::session::SessionIssuer;
use parkir_core::identity::IdentityResolver;
use parkir_core::repository::AccountRepository;
use parkir_core::{Account, Caller, LedgerError, LedgerResult, Role, Store};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use parkir_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub initial_balance: i64,
}

/// A signed-in account.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub account: Account,
}

pub struct AccountDirectory {
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityResolver>,
    sessions: SessionIssuer,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn Store>, identity: Arc<dyn IdentityResolver>, sessions: SessionIssuer) -> Self {
        Self {
            store,
            identity,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub async fn register(&self, new_account: NewAccount) -> LedgerResult<Account> {
        let email = normalize_email(&new_account.email)?;
        if new_account.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(LedgerError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }
        let name = new_account.name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("name must not be empty".into()));
        }
        let role: Role = new_account.role.parse()?;
        if new_account.initial_balance < 0 {
            return Err(LedgerError::Validation("initial balance must not be negative".into()));
        }

        let account = Account::new(
            email,
            name.to_string(),
            hash_password(&new_account.password)?,
            role,
            new_account.initial_balance,
        );
        self.store.insert_account(&account).await?;

        info!(account_id = %account.id, role = %role, "Registered account {}", Masked(&account.email));
        Ok(account)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> LedgerResult<Session> {
        let email = email.trim().to_lowercase();
        let account = match self.store.find_account_by_email(&email).await? {
            Some(account) if verify_password(password, &account.password_hash) => account,
            _ => {
                warn!("Failed login for {}", Masked(&email));
                return Err(LedgerError::invalid_credentials());
            }
        };

        let token = self.sessions.issue(&account)?;
        Ok(Session { token, account })
    }

    /// Signs in through a third-party identity, creating a seeker account on
    /// first use. An existing account is only reachable this way when it was
    /// created through the same external identity.
    pub async fn login_google(&self, id_token: &str) -> LedgerResult<Session> {
        let identity = self.identity.verify_id_token(id_token).await?;

        let account = match self.store.find_account_by_email(&identity.email).await? {
            Some(account) if account.is_linked_to(&identity.subject) => account,
            Some(account) => return Err(refuse_unlinked(&account)),
            None => {
                // No password hash: the account signs in through the provider only.
                let account = Account::new(
                    identity.email.clone(),
                    identity.name.clone(),
                    String::new(),
                    Role::Seeker,
                    0,
                )
                .with_external_subject(identity.subject.clone());
                match self.store.insert_account(&account).await {
                    Ok(()) => {
                        info!(account_id = %account.id, "Created account from external identity {}", Masked(&account.email));
                        account
                    }
                    // Lost a race with a concurrent first login.
                    Err(LedgerError::Conflict(_)) => match self.store.find_account_by_email(&identity.email).await? {
                        Some(existing) if existing.is_linked_to(&identity.subject) => existing,
                        Some(existing) => return Err(refuse_unlinked(&existing)),
                        None => return Err(LedgerError::invalid_credentials()),
                    },
                    Err(e) => return Err(e),
                }
            }
        };

        let token = self.sessions.issue(&account)?;
        Ok(Session { token, account })
    }

    pub async fn get_account(&self, caller: &Caller) -> LedgerResult<Account> {
        self.store
            .find_account(caller.account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", caller.account_id))
    }
}

fn normalize_email(raw: &str) -> LedgerResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(LedgerError::Validation("email is malformed".into()))
    }
}

fn refuse_unlinked(account: &Account) -> LedgerError {
    warn!(account_id = %account.id, "External sign-in refused for unlinked account {}", Masked(&account.email));
    LedgerError::Conflict("email is registered with a password; sign in with it instead".into())
}

/// Argon2id in PHC string format.
pub fn hash_password(password: &str) -> LedgerResult<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::Storage(format!("password hashing failed: {}", e)))
}

/// `false` for malformed or empty stored hashes.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkir_core::identity::MockIdentityResolver;
    use parkir_store::MemoryStore;

    fn directory() -> AccountDirectory {
        AccountDirectory::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockIdentityResolver),
            SessionIssuer::new("test-secret", 3600),
        )
    }

    fn new_account(email: &str, password: &str) -> NewAccount {
        NewAccount {
            email: email.into(),
            password: password.into(),
            name: "Sari".into(),
            role: "seeker".into(),
            initial_balance: 50_000,
        }
    }

    #[test]
    fn password_hashes_are_salted_argon2id() {
        let a = hash_password("rahasia").unwrap();
        let b = hash_password("rahasia").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("rahasia", &a));
        assert!(verify_password("rahasia", &b));
        assert!(!verify_password("rahasia!", &a));
        assert!(!verify_password("rahasia", "garbage"));
        assert!(!verify_password("", ""));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let directory = directory();

        let err = directory.register(new_account("not-an-email", "rahasia")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = directory.register(new_account("sari@mail.com", "12345")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let mut bad_role = new_account("sari@mail.com", "rahasia");
        bad_role.role = "admin".into();
        assert!(matches!(directory.register(bad_role).await, Err(LedgerError::Validation(_))));

        let mut negative = new_account("sari@mail.com", "rahasia");
        negative.initial_balance = -1;
        assert!(matches!(directory.register(negative).await, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_case_insensitively() {
        let directory = directory();
        directory.register(new_account("sari@mail.com", "rahasia")).await.unwrap();
        let err = directory.register(new_account(" Sari@Mail.com ", "rahasia")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let directory = directory();
        let account = directory.register(new_account("sari@mail.com", "rahasia")).await.unwrap();

        let session = directory.authenticate("SARI@mail.com", "rahasia").await.unwrap();
        assert_eq!(session.account.id, account.id);
        assert_eq!(directory.sessions().verify(&session.token).unwrap().account_id, account.id);

        let wrong_password = directory.authenticate("sari@mail.com", "salah!").await.unwrap_err();
        let unknown_email = directory.authenticate("nobody@mail.com", "rahasia").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), "invalid email or password");
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn external_login_creates_then_reuses_a_seeker() {
        let directory = directory();
        let first = directory.login_google("dewi@mail.com|Dewi").await.unwrap();
        assert_eq!(first.account.role, Role::Seeker);
        assert_eq!(first.account.balance, 0);

        let second = directory.login_google("dewi@mail.com").await.unwrap();
        assert_eq!(second.account.id, first.account.id);

        // Provider-only accounts have no usable password.
        assert!(directory.authenticate("dewi@mail.com", "").await.is_err());
    }

    #[tokio::test]
    async fn external_identity_cannot_take_over_a_password_account() {
        let directory = directory();
        let mut owner = new_account("owner@lot.id", "rahasia");
        owner.role = "owner".into();
        let owner = directory.register(owner).await.unwrap();

        let err = directory.login_google("owner@lot.id").await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        let err = directory.login_google("Owner@Lot.id|Mallory").await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        // The password still works and the account is unchanged.
        let session = directory.authenticate("owner@lot.id", "rahasia").await.unwrap();
        assert_eq!(session.account.id, owner.id);
        assert_eq!(session.account.role, Role::Owner);
    }

    #[test]
    fn serialized_account_hides_password_hash() {
        let account = Account::new("a@b.co".into(), "A".into(), hash_password("rahasia").unwrap(), Role::Seeker, 0);
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}

use crate::middleware::resiliency::CircuitBreaker;
use parkir_booking::{
    AccountDirectory, BookingLedger, BookingQueries, ChatService, GoogleIdentityResolver, HttpJwks, MockPaymentAdapter,
    NotificationHub, ParkingService, PaymentDesk, PaymentOrchestrator, QrGateAuthority, RetryPolicy, SessionIssuer,
};
use parkir_core::identity::{IdentityResolver, MockIdentityResolver};
use parkir_core::repository::QrTokenRepository;
use parkir_core::{LedgerResult, Store};
use parkir_store::app_config::{AuthConfig, Config, IdentityProvider};
use parkir_store::RedisClient;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ResiliencyState {
    pub payment_cb: Arc<CircuitBreaker>,
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountDirectory>,
    pub parkings: Arc<ParkingService>,
    pub ledger: Arc<BookingLedger>,
    pub payments: Arc<PaymentDesk>,
    pub queries: Arc<BookingQueries>,
    pub chat: Arc<ChatService>,
    pub notifications: NotificationHub,
    pub redis: Option<Arc<RedisClient>>,
    pub resiliency: ResiliencyState,
    pub requests_per_minute: i64,
}

impl AppState {
    /// Wires every service over one storage backend. With Redis configured the
    /// QR replay guard lives there; otherwise the store keeps it.
    pub fn build<S>(store: Arc<S>, redis: Option<RedisClient>, config: &Config) -> LedgerResult<Self>
    where
        S: Store + 'static,
    {
        let redis = redis.map(Arc::new);
        let replay_guard: Arc<dyn QrTokenRepository> = match &redis {
            Some(redis) => redis.clone(),
            None => store.clone(),
        };
        let store: Arc<dyn Store> = store;

        let notifications = NotificationHub::new(config.ledger.notification_buffer);
        let retry = RetryPolicy::new(
            config.ledger.max_retries,
            Duration::from_millis(config.ledger.retry_backoff_ms),
        );

        let sessions = SessionIssuer::new(config.auth.jwt_secret.clone(), config.auth.jwt_expiration_seconds);
        let accounts = AccountDirectory::new(store.clone(), identity_resolver(&config.auth)?, sessions);

        let ledger = Arc::new(BookingLedger::new(
            store.clone(),
            replay_guard,
            QrGateAuthority::new(&config.qr.secret, config.qr.validity_seconds)?,
            notifications.clone(),
            retry,
        ));

        let orchestrator = PaymentOrchestrator::new(Arc::new(MockPaymentAdapter), config.payment.currency.clone());
        let payments = PaymentDesk::new(
            ledger.clone(),
            store.clone(),
            orchestrator,
            config.payment.server_key.clone(),
            retry,
        );

        Ok(Self {
            accounts: Arc::new(accounts),
            parkings: Arc::new(ParkingService::new(store.clone())),
            ledger,
            payments: Arc::new(payments),
            queries: Arc::new(BookingQueries::new(store.clone())),
            chat: Arc::new(ChatService::new(store, notifications.clone())),
            notifications,
            redis,
            resiliency: ResiliencyState {
                payment_cb: Arc::new(CircuitBreaker::new(
                    "payment",
                    config.payment.circuit_failure_threshold,
                    Duration::from_secs(config.payment.circuit_reset_seconds),
                )),
            },
            requests_per_minute: config.rate_limit.requests_per_minute,
        })
    }
}

fn identity_resolver(auth: &AuthConfig) -> LedgerResult<Arc<dyn IdentityResolver>> {
    match auth.identity {
        IdentityProvider::Google => {
            let keys = HttpJwks::new(auth.google_jwks_url.clone())?;
            Ok(Arc::new(GoogleIdentityResolver::new(
                auth.google_client_id.clone(),
                Arc::new(keys),
            )))
        }
        IdentityProvider::Mock => {
            tracing::warn!("Mock identity resolver enabled: external sign-in is NOT verified");
            Ok(Arc::new(MockIdentityResolver))
        }
    }
}

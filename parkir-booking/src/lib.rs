pub mod accounts;
pub mod chat;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod parking;
pub mod payments;
pub mod qr;
pub mod query;
pub mod retry;
pub mod session;

pub use accounts::{AccountDirectory, NewAccount, Session};
pub use chat::ChatService;
pub use identity::{GoogleIdentityResolver, HttpJwks, JwksSource};
pub use ledger::{BookingLedger, NewBooking};
pub use notify::NotificationHub;
pub use parking::ParkingService;
pub use payments::{MockPaymentAdapter, PaymentDesk, PaymentOrchestrator, PaymentOutcome, WebhookOutcome};
pub use qr::{IssuedQr, QrClaims, QrGateAuthority};
pub use query::{BookingPage, BookingQueries, PageRequest, ParkingBookings, ParkingSpot};
pub use retry::RetryPolicy;
pub use session::{SessionClaims, SessionIssuer};

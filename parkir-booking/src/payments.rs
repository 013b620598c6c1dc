use crate::ledger::BookingLedger;
use crate::retry::RetryPolicy;
use chrono::Utc;
use parkir_core::repository::{AccountRepository, ParkingRepository, PaymentEventRepository};
use parkir_core::payment::{GatewayVerdict, PaymentAdapter, PaymentIntent, PaymentNotification, PaymentStatus};
use parkir_core::{Booking, BookingStatus, Caller, LedgerError, LedgerResult, Store};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
    currency: String,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>, currency: impl Into<String>) -> Self {
        Self {
            adapter,
            currency: currency.into(),
        }
    }

    /// Initialize a payment intent for a booking
    pub async fn initialize_payment(&self, booking_id: Uuid, amount: i64) -> LedgerResult<PaymentIntent> {
        self.adapter.create_intent(booking_id, amount, &self.currency).await
    }
}

pub struct MockPaymentAdapter;

#[async_trait::async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(&self, booking_id: Uuid, amount: i64, currency: &str) -> LedgerResult<PaymentIntent> {
        Ok(PaymentIntent {
            id: format!("mock_pi_{}", booking_id.simple()),
            booking_id,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::RequiresAction,
            redirect_url: Some(format!("https://checkout.mock/{}", booking_id.simple())),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Paid from balance; the booking is confirmed.
    Settled { booking: Booking },
    /// Waiting for the gateway webhook; the booking stays pending.
    AwaitingGateway { intent: PaymentIntent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed,
    /// Money credited but the booking could not be confirmed; it stays as balance.
    Credited,
    Cancelled,
    Duplicate,
    Ignored,
}

const BALANCE_METHOD: &str = "saldo";

/// Payment entry points: balance payments, gateway intents and gateway webhooks.
pub struct PaymentDesk {
    ledger: Arc<BookingLedger>,
    store: Arc<dyn Store>,
    orchestrator: PaymentOrchestrator,
    server_key: String,
    retry: RetryPolicy,
}

impl PaymentDesk {
    pub fn new(
        ledger: Arc<BookingLedger>,
        store: Arc<dyn Store>,
        orchestrator: PaymentOrchestrator,
        server_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            store,
            orchestrator,
            server_key: server_key.into(),
            retry,
        }
    }

    pub async fn process_booking_payment(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        method: &str,
    ) -> LedgerResult<PaymentOutcome> {
        let method = method.trim();
        if method.is_empty() {
            return Err(LedgerError::Validation("payment method is required".into()));
        }

        if method.eq_ignore_ascii_case(BALANCE_METHOD) {
            let booking = self.ledger.confirm_booking(caller, booking_id).await?;
            return Ok(PaymentOutcome::Settled { booking });
        }

        let booking = self.ledger.load_owned_booking(caller, booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(LedgerError::InvalidState {
                status: booking.status,
                action: "pay for",
            });
        }

        let lot = self
            .store
            .find_parking(booking.parking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("parking", booking.parking_id))?;
        let amount = parkir_inventory::booking_cost(&lot, booking.vehicle_type, booking.duration_hours)?;

        let intent = self.orchestrator.initialize_payment(booking.id, amount).await?;
        info!(booking_id = %booking.id, method, amount, intent_id = %intent.id, "Payment intent created");
        Ok(PaymentOutcome::AwaitingGateway { intent })
    }

    /// Applies a gateway notification once per transaction id. When applying
    /// fails the transaction id is forgotten again, so the gateway's
    /// redelivery gets another attempt instead of a duplicate ack.
    pub async fn handle_notification(&self, notification: &PaymentNotification) -> LedgerResult<WebhookOutcome> {
        if !notification.verify(&self.server_key) {
            warn!(order_id = %notification.order_id, "Webhook rejected: bad signature");
            return Err(LedgerError::Auth("invalid signature".into()));
        }

        let booking_id = notification.booking_id()?;
        let verdict = notification.verdict();
        let amount = match verdict {
            GatewayVerdict::Settled => Some(notification.amount()?),
            _ => None,
        };
        let booking = self.ledger.find_booking(booking_id).await?;

        let transaction_id = notification.transaction_id.as_str();
        let received_at = Utc::now();
        let first_delivery = self
            .retry
            .run("record_payment_event", || {
                self.store.record_payment_event(transaction_id, received_at)
            })
            .await?;
        if !first_delivery {
            info!(transaction_id, "Duplicate payment notification");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.apply(booking, verdict, amount).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(transaction_id, booking_id = %booking_id, "Payment notification not applied: {}", err);
                if let Err(forget_err) = self
                    .retry
                    .run("forget_payment_event", || self.store.forget_payment_event(transaction_id))
                    .await
                {
                    error!(transaction_id, "Redelivery will be treated as a duplicate: {}", forget_err);
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        booking: Booking,
        verdict: GatewayVerdict,
        amount: Option<i64>,
    ) -> LedgerResult<WebhookOutcome> {
        match (verdict, amount) {
            (GatewayVerdict::Settled, Some(amount)) => {
                self.retry
                    .run("credit_gateway_payment", || self.store.adjust_balance(booking.user_id, amount))
                    .await?;
                info!(booking_id = %booking.id, amount, "Gateway payment credited");

                // From here on the money is in the balance; confirming is best effort.
                if booking.status != BookingStatus::Pending {
                    return Ok(WebhookOutcome::Credited);
                }
                let booking_id = booking.id;
                match self.ledger.settle(booking).await {
                    Ok(_) => Ok(WebhookOutcome::Confirmed),
                    Err(err) => {
                        warn!(booking_id = %booking_id, "Paid booking could not be confirmed, credit kept: {}", err);
                        Ok(WebhookOutcome::Credited)
                    }
                }
            }
            (GatewayVerdict::Failed, _) => match self.ledger.cancel_unpaid(booking.id).await? {
                Some(_) => Ok(WebhookOutcome::Cancelled),
                None => Ok(WebhookOutcome::Ignored),
            },
            _ => Ok(WebhookOutcome::Ignored),
        }
    }
}

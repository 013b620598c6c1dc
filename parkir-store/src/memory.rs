use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parkir_core::repository::{
    AccountRepository, BookingRepository, ChatRepository, ParkingRepository, PaymentEventRepository,
    QrTokenRepository,
};
use parkir_core::{
    Account, Booking, BookingQuery, BookingSlice, BookingStats, BookingStatus, LedgerError, LedgerResult,
    LotStatus, Message, ParkingDetails, ParkingLot, PerVehicle, Room, VehicleType,
};
use parkir_inventory::SlotRelease;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store. Every conditional update runs under the write lock of
/// the table it touches, which is what makes reserve/debit/mark-used atomic.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    parkings: RwLock<HashMap<Uuid, ParkingLot>>,
    bookings: RwLock<HashMap<Uuid, Booking>>,
    qr_uses: RwLock<HashMap<Uuid, DateTime<Utc>>>,
    chat: RwLock<ChatTables>,
    payment_events: RwLock<HashSet<String>>,
}

#[derive(Default)]
struct ChatTables {
    rooms: HashMap<Uuid, Room>,
    messages: HashMap<Uuid, Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(LedgerError::Conflict("email already registered".into()));
        }
        if let Some(subject) = account.external_subject.as_deref() {
            if accounts.values().any(|a| a.is_linked_to(subject)) {
                return Err(LedgerError::Conflict("external identity already linked".into()));
            }
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, id: Uuid) -> LedgerResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> LedgerResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn adjust_balance(&self, id: Uuid, delta: i64) -> LedgerResult<i64> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("account", id))?;

        let next = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Validation("balance overflow".into()))?;
        if next < 0 {
            return Err(LedgerError::InsufficientFunds {
                balance: account.balance,
                required: -delta,
            });
        }

        account.balance = next;
        account.updated_at = Utc::now();
        Ok(next)
    }
}

#[async_trait]
impl ParkingRepository for MemoryStore {
    async fn insert_parking(&self, lot: &ParkingLot) -> LedgerResult<()> {
        self.parkings.write().await.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn find_parking(&self, id: Uuid) -> LedgerResult<Option<ParkingLot>> {
        Ok(self.parkings.read().await.get(&id).cloned())
    }

    async fn update_parking_details(&self, id: Uuid, details: &ParkingDetails) -> LedgerResult<ParkingLot> {
        let mut parkings = self.parkings.write().await;
        let lot = parkings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("parking", id))?;
        lot.apply_details(details.clone());
        Ok(lot.clone())
    }

    async fn set_capacity(&self, id: Uuid, capacity: PerVehicle<u32>) -> LedgerResult<ParkingLot> {
        let mut parkings = self.parkings.write().await;
        let lot = parkings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("parking", id))?;
        parkir_inventory::resize(lot, capacity)?;
        Ok(lot.clone())
    }

    async fn set_parking_status(&self, id: Uuid, status: LotStatus) -> LedgerResult<ParkingLot> {
        let mut parkings = self.parkings.write().await;
        let lot = parkings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("parking", id))?;
        lot.status = status;
        lot.updated_at = Utc::now();
        Ok(lot.clone())
    }

    async fn reserve_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32> {
        let mut parkings = self.parkings.write().await;
        let lot = parkings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("parking", id))?;
        Ok(parkir_inventory::reserve_slot(lot, vehicle_type)?)
    }

    async fn release_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32> {
        let mut parkings = self.parkings.write().await;
        let lot = parkings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("parking", id))?;
        let release: SlotRelease = parkir_inventory::release_slot(lot, vehicle_type);
        Ok(release.available())
    }

    async fn search_parkings(&self, query: &str) -> LedgerResult<Vec<ParkingLot>> {
        let needle = query.trim().to_lowercase();
        let mut lots: Vec<ParkingLot> = self
            .parkings
            .read()
            .await
            .values()
            .filter(|lot| lot.status == LotStatus::Active)
            .filter(|lot| {
                needle.is_empty()
                    || lot.name.to_lowercase().contains(&needle)
                    || lot.address.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lots)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> LedgerResult<()> {
        self.bookings.write().await.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_booking(&self, id: Uuid) -> LedgerResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn update_booking_if(&self, booking: &Booking, expected: BookingStatus) -> LedgerResult<bool> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| LedgerError::not_found("booking", booking.id))?;

        if stored.status != expected {
            return Ok(false);
        }
        *stored = booking.clone();
        Ok(true)
    }

    async fn list_bookings(&self, query: &BookingQuery) -> LedgerResult<BookingSlice> {
        let bookings = self.bookings.read().await;
        let mut matching: Vec<&Booking> = bookings.values().filter(|b| query.matches(b)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(BookingSlice { items, total })
    }

    async fn booking_stats(&self, parking_id: Uuid, today: NaiveDate) -> LedgerResult<BookingStats> {
        let mut stats = BookingStats::default();
        for booking in self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.parking_id == parking_id)
        {
            stats.record(booking, today);
        }
        Ok(stats)
    }
}

#[async_trait]
impl QrTokenRepository for MemoryStore {
    async fn mark_used(&self, jti: Uuid, used_at: DateTime<Utc>) -> LedgerResult<bool> {
        let mut uses = self.qr_uses.write().await;
        if uses.contains_key(&jti) {
            return Ok(false);
        }
        uses.insert(jti, used_at);
        Ok(true)
    }

    async fn release_use(&self, jti: Uuid) -> LedgerResult<()> {
        self.qr_uses.write().await.remove(&jti);
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn find_or_create_room(&self, parking_id: Uuid, seeker_id: Uuid, owner_id: Uuid) -> LedgerResult<Room> {
        let mut chat = self.chat.write().await;
        if let Some(room) = chat
            .rooms
            .values()
            .find(|r| r.parking_id == parking_id && r.seeker_id == seeker_id)
        {
            return Ok(room.clone());
        }

        let room = Room::new(parking_id, seeker_id, owner_id);
        chat.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_room(&self, id: Uuid) -> LedgerResult<Option<Room>> {
        Ok(self.chat.read().await.rooms.get(&id).cloned())
    }

    async fn rooms_for_user(&self, account_id: Uuid) -> LedgerResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .chat
            .read()
            .await
            .rooms
            .values()
            .filter(|r| r.has_participant(account_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rooms)
    }

    async fn append_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
        client_message_id: Option<&str>,
    ) -> LedgerResult<(Message, bool)> {
        let mut chat = self.chat.write().await;
        let ChatTables { rooms, messages } = &mut *chat;

        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| LedgerError::not_found("room", room_id))?;
        let log = messages.entry(room_id).or_default();

        if let Some(client_id) = client_message_id {
            if let Some(existing) = log
                .iter()
                .find(|m| m.sender_id == sender_id && m.client_message_id.as_deref() == Some(client_id))
            {
                return Ok((existing.clone(), false));
            }
        }

        let now = Utc::now();
        room.last_seq += 1;
        room.last_message = Some(content.to_string());
        room.updated_at = now;

        let message = Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            seq: room.last_seq,
            content: content.to_string(),
            client_message_id: client_message_id.map(str::to_string),
            created_at: now,
        };
        log.push(message.clone());
        Ok((message, true))
    }

    async fn messages(&self, room_id: Uuid, after_seq: Option<u64>) -> LedgerResult<Vec<Message>> {
        let chat = self.chat.read().await;
        let after = after_seq.unwrap_or(0);
        Ok(chat
            .messages
            .get(&room_id)
            .map(|log| log.iter().filter(|m| m.seq > after).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PaymentEventRepository for MemoryStore {
    async fn record_payment_event(&self, transaction_id: &str, _received_at: DateTime<Utc>) -> LedgerResult<bool> {
        Ok(self.payment_events.write().await.insert(transaction_id.to_string()))
    }

    async fn forget_payment_event(&self, transaction_id: &str) -> LedgerResult<()> {
        self.payment_events.write().await.remove(transaction_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkir_core::{OperationalHours, Role};
    use std::sync::Arc;

    fn lot(owner: Uuid, car: u32) -> ParkingLot {
        ParkingLot::new(
            owner,
            ParkingDetails {
                name: "Gedung Parkir Blok M".into(),
                address: "Jl. Melawai".into(),
                latitude: None,
                longitude: None,
                hourly_rate: PerVehicle::new(10_000, 3_000),
                operational_hours: OperationalHours::around_the_clock(),
            },
            PerVehicle::new(car, 0),
        )
    }

    #[tokio::test]
    async fn balance_never_goes_negative() {
        let store = MemoryStore::new();
        let account = Account::new("rina@parkir.id".into(), "Rina".into(), "x$y".into(), Role::Seeker, 5_000);
        store.insert_account(&account).await.unwrap();

        assert_eq!(store.adjust_balance(account.id, -3_000).await.unwrap(), 2_000);
        let err = store.adjust_balance(account.id, -3_000).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { balance: 2_000, required: 3_000 }));
        assert_eq!(store.find_account(account.id).await.unwrap().unwrap().balance, 2_000);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let a = Account::new("dup@parkir.id".into(), "A".into(), "x$y".into(), Role::Seeker, 0);
        let b = Account::new("dup@parkir.id".into(), "B".into(), "x$y".into(), Role::Owner, 0);
        store.insert_account(&a).await.unwrap();
        assert!(matches!(store.insert_account(&b).await, Err(LedgerError::Conflict(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let lot = lot(Uuid::new_v4(), 3);
        store.insert_parking(&lot).await.unwrap();
        let lot_id = lot.id;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve_slot(lot_id, VehicleType::Car).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(store.find_parking(lot_id).await.unwrap().unwrap().available.car, 0);
    }

    #[tokio::test]
    async fn release_is_clamped_at_capacity() {
        let store = MemoryStore::new();
        let lot = lot(Uuid::new_v4(), 1);
        store.insert_parking(&lot).await.unwrap();

        assert_eq!(store.release_slot(lot.id, VehicleType::Car).await.unwrap(), 1);
        store.reserve_slot(lot.id, VehicleType::Car).await.unwrap();
        assert_eq!(store.release_slot(lot.id, VehicleType::Car).await.unwrap(), 1);
        assert_eq!(store.release_slot(lot.id, VehicleType::Car).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn qr_use_is_recorded_once() {
        let store = MemoryStore::new();
        let jti = Uuid::new_v4();
        assert!(store.mark_used(jti, Utc::now()).await.unwrap());
        assert!(!store.mark_used(jti, Utc::now()).await.unwrap());

        store.release_use(jti).await.unwrap();
        assert!(store.mark_used(jti, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn forgotten_payment_event_can_be_recorded_again() {
        let store = MemoryStore::new();
        assert!(store.record_payment_event("trx-9", Utc::now()).await.unwrap());
        assert!(!store.record_payment_event("trx-9", Utc::now()).await.unwrap());

        store.forget_payment_event("trx-9").await.unwrap();
        assert!(store.record_payment_event("trx-9", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn status_compare_and_set() {
        let store = MemoryStore::new();
        let mut booking = Booking::new(Uuid::new_v4(), Uuid::new_v4(), VehicleType::Car, Utc::now(), 1);
        store.insert_booking(&booking).await.unwrap();

        booking.update_status(BookingStatus::Cancelled);
        assert!(store.update_booking_if(&booking, BookingStatus::Pending).await.unwrap());
        booking.update_status(BookingStatus::Confirmed);
        assert!(!store.update_booking_if(&booking, BookingStatus::Pending).await.unwrap());
        assert_eq!(
            store.find_booking(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn messages_are_idempotent_per_client_id() {
        let store = MemoryStore::new();
        let room = store
            .find_or_create_room(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let (first, created) = store
            .append_message(room.id, room.seeker_id, "Masih ada slot?", Some("c-1"))
            .await
            .unwrap();
        assert!(created);
        let (again, created) = store
            .append_message(room.id, room.seeker_id, "Masih ada slot?", Some("c-1"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);

        store.append_message(room.id, room.owner_id, "Ada", None).await.unwrap();
        let after_first = store.messages(room.id, Some(first.seq)).await.unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].content, "Ada");
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use parkir_core::repository::{
    AccountRepository, BookingRepository, ChatRepository, ParkingRepository, PaymentEventRepository,
    QrTokenRepository,
};
use parkir_core::{
    Account, Booking, BookingQuery, BookingSlice, BookingStats, BookingStatus, LedgerError, LedgerResult,
    LotStatus, Message, OperationalHours, ParkingDetails, ParkingLot, PerVehicle, Room, VehicleType,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, email, name, password_hash, external_subject, role, balance, created_at, updated_at";

const PARKING_COLUMNS: &str = "id, owner_id, name, address, latitude, longitude, \
    capacity_car, capacity_motorcycle, available_car, available_motorcycle, \
    rate_car, rate_motorcycle, open_time, close_time, status, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, user_id, parking_id, vehicle_type, start_time, duration_hours, \
    cost, status, entry_qr, exit_qr, created_at, updated_at";

const ROOM_COLUMNS: &str = "id, parking_id, seeker_id, owner_id, last_message, last_seq, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, seq, content, client_message_id, created_at";

/// Postgres-backed store. Every conditional update is a single guarded
/// statement or a row-locked transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs `apply` against the lot under `SELECT ... FOR UPDATE` and writes
    /// the slot counters back.
    async fn with_locked_lot<T: Send>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut ParkingLot) -> LedgerResult<T> + Send,
    ) -> LedgerResult<(ParkingLot, T)> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row: Option<ParkingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM parking_lots WHERE id = $1 FOR UPDATE",
            PARKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut lot = ParkingLot::try_from(row.ok_or_else(|| LedgerError::not_found("parking", id))?)?;
        let outcome = apply(&mut lot)?;

        sqlx::query(
            "UPDATE parking_lots SET capacity_car = $2, capacity_motorcycle = $3, \
             available_car = $4, available_motorcycle = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(id)
        .bind(to_i32(lot.capacity.car)?)
        .bind(to_i32(lot.capacity.motorcycle)?)
        .bind(to_i32(lot.available.car)?)
        .bind(to_i32(lot.available.motorcycle)?)
        .bind(lot.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok((lot, outcome))
    }

    async fn booking_exists(&self, id: Uuid) -> LedgerResult<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(found.is_some())
    }
}

/// Serialization failures and deadlocks are retryable; unique violations are conflicts.
fn db_error(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") => return LedgerError::Contention(db.message().to_string()),
            Some("23505") => return LedgerError::Conflict(db.message().to_string()),
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database error");
    LedgerError::Storage(err.to_string())
}

fn to_i32(value: u32) -> LedgerResult<i32> {
    i32::try_from(value).map_err(|_| LedgerError::Validation(format!("{} is out of range", value)))
}

fn to_u32(value: i32, field: &str) -> LedgerResult<u32> {
    u32::try_from(value).map_err(|_| LedgerError::Storage(format!("negative {} in storage: {}", field, value)))
}

fn to_u64(value: i64, field: &str) -> LedgerResult<u64> {
    u64::try_from(value).map_err(|_| LedgerError::Storage(format!("negative {} in storage: {}", field, value)))
}

fn slot_column(vehicle_type: VehicleType) -> &'static str {
    match vehicle_type {
        VehicleType::Car => "available_car",
        VehicleType::Motorcycle => "available_motorcycle",
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    external_subject: Option<String>,
    role: String,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> LedgerResult<Self> {
        Ok(Account {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            external_subject: row.external_subject,
            role: row.role.parse()?,
            balance: row.balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParkingRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    capacity_car: i32,
    capacity_motorcycle: i32,
    available_car: i32,
    available_motorcycle: i32,
    rate_car: i64,
    rate_motorcycle: i64,
    open_time: NaiveTime,
    close_time: NaiveTime,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ParkingRow> for ParkingLot {
    type Error = LedgerError;

    fn try_from(row: ParkingRow) -> LedgerResult<Self> {
        Ok(ParkingLot {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            capacity: PerVehicle::new(
                to_u32(row.capacity_car, "capacity_car")?,
                to_u32(row.capacity_motorcycle, "capacity_motorcycle")?,
            ),
            available: PerVehicle::new(
                to_u32(row.available_car, "available_car")?,
                to_u32(row.available_motorcycle, "available_motorcycle")?,
            ),
            hourly_rate: PerVehicle::new(row.rate_car, row.rate_motorcycle),
            operational_hours: OperationalHours {
                open: row.open_time,
                close: row.close_time,
            },
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    parking_id: Uuid,
    vehicle_type: String,
    start_time: DateTime<Utc>,
    duration_hours: i32,
    cost: Option<i64>,
    status: String,
    entry_qr: Option<String>,
    exit_qr: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = LedgerError;

    fn try_from(row: BookingRow) -> LedgerResult<Self> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            parking_id: row.parking_id,
            vehicle_type: row.vehicle_type.parse()?,
            start_time: row.start_time,
            duration_hours: to_u32(row.duration_hours, "duration_hours")?,
            cost: row.cost,
            status: row.status.parse()?,
            entry_qr: row.entry_qr,
            exit_qr: row.exit_qr,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    parking_id: Uuid,
    seeker_id: Uuid,
    owner_id: Uuid,
    last_message: Option<String>,
    last_seq: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = LedgerError;

    fn try_from(row: RoomRow) -> LedgerResult<Self> {
        Ok(Room {
            id: row.id,
            parking_id: row.parking_id,
            seeker_id: row.seeker_id,
            owner_id: row.owner_id,
            last_message: row.last_message,
            last_seq: to_u64(row.last_seq, "last_seq")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    seq: i64,
    content: String,
    client_message_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = LedgerError;

    fn try_from(row: MessageRow) -> LedgerResult<Self> {
        Ok(Message {
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            seq: to_u64(row.seq, "seq")?,
            content: row.content,
            client_message_id: row.client_message_id,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO accounts (id, email, name, password_hash, external_subject, role, balance, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.external_subject.as_deref())
        .bind(account.role.as_str())
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_error(e) {
            LedgerError::Conflict(_) => LedgerError::Conflict("email already registered".into()),
            other => other,
        })?;
        Ok(())
    }

    async fn find_account(&self, id: Uuid) -> LedgerResult<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Account::try_from).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> LedgerResult<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {} FROM accounts WHERE email = $1", ACCOUNT_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Account::try_from).transpose()
    }

    async fn adjust_balance(&self, id: Uuid, delta: i64) -> LedgerResult<i64> {
        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE accounts SET balance = balance + $2, updated_at = NOW() \
             WHERE id = $1 AND balance + $2 >= 0 RETURNING balance",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some((balance,)) = updated {
            return Ok(balance);
        }

        let account = self
            .find_account(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", id))?;
        Err(LedgerError::InsufficientFunds {
            balance: account.balance,
            required: -delta,
        })
    }
}

#[async_trait]
impl ParkingRepository for PgStore {
    async fn insert_parking(&self, lot: &ParkingLot) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO parking_lots (id, owner_id, name, address, latitude, longitude, \
             capacity_car, capacity_motorcycle, available_car, available_motorcycle, \
             rate_car, rate_motorcycle, open_time, close_time, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(lot.id)
        .bind(lot.owner_id)
        .bind(&lot.name)
        .bind(&lot.address)
        .bind(lot.latitude)
        .bind(lot.longitude)
        .bind(to_i32(lot.capacity.car)?)
        .bind(to_i32(lot.capacity.motorcycle)?)
        .bind(to_i32(lot.available.car)?)
        .bind(to_i32(lot.available.motorcycle)?)
        .bind(lot.hourly_rate.car)
        .bind(lot.hourly_rate.motorcycle)
        .bind(lot.operational_hours.open)
        .bind(lot.operational_hours.close)
        .bind(lot.status.as_str())
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_parking(&self, id: Uuid) -> LedgerResult<Option<ParkingLot>> {
        let row: Option<ParkingRow> =
            sqlx::query_as(&format!("SELECT {} FROM parking_lots WHERE id = $1", PARKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(ParkingLot::try_from).transpose()
    }

    async fn update_parking_details(&self, id: Uuid, details: &ParkingDetails) -> LedgerResult<ParkingLot> {
        let row: Option<ParkingRow> = sqlx::query_as(&format!(
            "UPDATE parking_lots SET name = $2, address = $3, latitude = $4, longitude = $5, \
             rate_car = $6, rate_motorcycle = $7, open_time = $8, close_time = $9, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PARKING_COLUMNS
        ))
        .bind(id)
        .bind(&details.name)
        .bind(&details.address)
        .bind(details.latitude)
        .bind(details.longitude)
        .bind(details.hourly_rate.car)
        .bind(details.hourly_rate.motorcycle)
        .bind(details.operational_hours.open)
        .bind(details.operational_hours.close)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        ParkingLot::try_from(row.ok_or_else(|| LedgerError::not_found("parking", id))?)
    }

    async fn set_capacity(&self, id: Uuid, capacity: PerVehicle<u32>) -> LedgerResult<ParkingLot> {
        let (lot, ()) = self
            .with_locked_lot(id, |lot| Ok(parkir_inventory::resize(lot, capacity)?))
            .await?;
        Ok(lot)
    }

    async fn set_parking_status(&self, id: Uuid, status: LotStatus) -> LedgerResult<ParkingLot> {
        let row: Option<ParkingRow> = sqlx::query_as(&format!(
            "UPDATE parking_lots SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PARKING_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        ParkingLot::try_from(row.ok_or_else(|| LedgerError::not_found("parking", id))?)
    }

    async fn reserve_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32> {
        let column = slot_column(vehicle_type);
        let remaining: Option<(i32,)> = sqlx::query_as(&format!(
            "UPDATE parking_lots SET {col} = {col} - 1, updated_at = NOW() \
             WHERE id = $1 AND {col} > 0 RETURNING {col}",
            col = column
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some((remaining,)) = remaining {
            return to_u32(remaining, column);
        }
        if self.find_parking(id).await?.is_none() {
            return Err(LedgerError::not_found("parking", id));
        }
        Err(LedgerError::CapacityExceeded {
            parking_id: id,
            vehicle_type,
        })
    }

    async fn release_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32> {
        let (_, release) = self
            .with_locked_lot(id, |lot| Ok(parkir_inventory::release_slot(lot, vehicle_type)))
            .await?;
        Ok(release.available())
    }

    async fn search_parkings(&self, query: &str) -> LedgerResult<Vec<ParkingLot>> {
        let needle = query.trim();
        let rows: Vec<ParkingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM parking_lots WHERE status = 'active' \
             AND ($1 = '' OR name ILIKE $2 OR address ILIKE $2) ORDER BY name",
            PARKING_COLUMNS
        ))
        .bind(needle)
        .bind(like_pattern(needle))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(ParkingLot::try_from).collect()
    }
}

fn push_booking_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookingQuery) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(parking_id) = query.parking_id {
        builder.push(" AND parking_id = ").push_bind(parking_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_booking(&self, booking: &Booking) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO bookings (id, user_id, parking_id, vehicle_type, start_time, duration_hours, \
             cost, status, entry_qr, exit_qr, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.parking_id)
        .bind(booking.vehicle_type.as_str())
        .bind(booking.start_time)
        .bind(to_i32(booking.duration_hours)?)
        .bind(booking.cost)
        .bind(booking.status.as_str())
        .bind(&booking.entry_qr)
        .bind(&booking.exit_qr)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_booking(&self, id: Uuid) -> LedgerResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_booking_if(&self, booking: &Booking, expected: BookingStatus) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $2, cost = $3, entry_qr = $4, exit_qr = $5, updated_at = $6 \
             WHERE id = $1 AND status = $7",
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.cost)
        .bind(&booking.entry_qr)
        .bind(&booking.exit_qr)
        .bind(booking.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.booking_exists(booking.id).await? {
            return Err(LedgerError::not_found("booking", booking.id));
        }
        Ok(false)
    }

    async fn list_bookings(&self, query: &BookingQuery) -> LedgerResult<BookingSlice> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings");
        push_booking_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM bookings", BOOKING_COLUMNS));
        push_booking_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows: Vec<BookingRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(BookingSlice {
            items: rows.into_iter().map(Booking::try_from).collect::<LedgerResult<_>>()?,
            total: usize::try_from(total).unwrap_or(0),
        })
    }

    async fn booking_stats(&self, parking_id: Uuid, today: NaiveDate) -> LedgerResult<BookingStats> {
        let day_start = today.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(cost), 0)::BIGINT, \
             COUNT(*) FILTER (WHERE created_at >= $2 AND created_at < $3) \
             FROM bookings WHERE parking_id = $1 GROUP BY status",
        )
        .bind(parking_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut stats = BookingStats::default();
        for (status, count, cost_sum, today_count) in rows {
            let status: BookingStatus = status.parse()?;
            stats.record_counts(status, to_u64(count, "count")?, cost_sum);
            stats.today += to_u64(today_count, "today")?;
        }
        Ok(stats)
    }
}

#[async_trait]
impl QrTokenRepository for PgStore {
    async fn mark_used(&self, jti: Uuid, used_at: DateTime<Utc>) -> LedgerResult<bool> {
        let result = sqlx::query("INSERT INTO qr_token_uses (jti, used_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(used_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_use(&self, jti: Uuid) -> LedgerResult<()> {
        sqlx::query("DELETE FROM qr_token_uses WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for PgStore {
    async fn find_or_create_room(&self, parking_id: Uuid, seeker_id: Uuid, owner_id: Uuid) -> LedgerResult<Room> {
        let candidate = Room::new(parking_id, seeker_id, owner_id);
        sqlx::query(
            "INSERT INTO rooms (id, parking_id, seeker_id, owner_id, last_seq, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $6) ON CONFLICT (parking_id, seeker_id) DO NOTHING",
        )
        .bind(candidate.id)
        .bind(parking_id)
        .bind(seeker_id)
        .bind(owner_id)
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let row: RoomRow = sqlx::query_as(&format!(
            "SELECT {} FROM rooms WHERE parking_id = $1 AND seeker_id = $2",
            ROOM_COLUMNS
        ))
        .bind(parking_id)
        .bind(seeker_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Room::try_from(row)
    }

    async fn find_room(&self, id: Uuid) -> LedgerResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!("SELECT {} FROM rooms WHERE id = $1", ROOM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Room::try_from).transpose()
    }

    async fn rooms_for_user(&self, account_id: Uuid) -> LedgerResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rooms WHERE seeker_id = $1 OR owner_id = $1 ORDER BY updated_at DESC",
            ROOM_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(Room::try_from).collect()
    }

    async fn append_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
        client_message_id: Option<&str>,
    ) -> LedgerResult<(Message, bool)> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let last_seq: Option<(i64,)> = sqlx::query_as("SELECT last_seq FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let (last_seq,) = last_seq.ok_or_else(|| LedgerError::not_found("room", room_id))?;

        if let Some(client_id) = client_message_id {
            let existing: Option<MessageRow> = sqlx::query_as(&format!(
                "SELECT {} FROM messages WHERE room_id = $1 AND sender_id = $2 AND client_message_id = $3",
                MESSAGE_COLUMNS
            ))
            .bind(room_id)
            .bind(sender_id)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

            if let Some(row) = existing {
                tx.commit().await.map_err(db_error)?;
                return Ok((Message::try_from(row)?, false));
            }
        }

        let seq = last_seq + 1;
        let now = Utc::now();
        let row: MessageRow = sqlx::query_as(&format!(
            "INSERT INTO messages (id, room_id, sender_id, seq, content, client_message_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(sender_id)
        .bind(seq)
        .bind(content)
        .bind(client_message_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query("UPDATE rooms SET last_seq = $2, last_message = $3, updated_at = $4 WHERE id = $1")
            .bind(room_id)
            .bind(seq)
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok((Message::try_from(row)?, true))
    }

    async fn messages(&self, room_id: Uuid, after_seq: Option<u64>) -> LedgerResult<Vec<Message>> {
        let after = i64::try_from(after_seq.unwrap_or(0)).unwrap_or(i64::MAX);
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE room_id = $1 AND seq > $2 ORDER BY seq",
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(Message::try_from).collect()
    }
}

#[async_trait]
impl PaymentEventRepository for PgStore {
    async fn record_payment_event(&self, transaction_id: &str, received_at: DateTime<Utc>) -> LedgerResult<bool> {
        let result = sqlx::query(
            "INSERT INTO payment_events (transaction_id, received_at) VALUES ($1, $2) \
             ON CONFLICT (transaction_id) DO NOTHING",
        )
        .bind(transaction_id)
        .bind(received_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn forget_payment_event(&self, transaction_id: &str) -> LedgerResult<()> {
        sqlx::query("DELETE FROM payment_events WHERE transaction_id = $1")
            .bind(transaction_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

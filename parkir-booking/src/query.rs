use chrono::Utc;
use parkir_core::repository::{BookingRepository, ParkingRepository};
use parkir_core::{Booking, BookingQuery, BookingStats, BookingStatus, Caller, LedgerError, LedgerResult, ParkingLot, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub status: Option<BookingStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageRequest {
    fn resolve(&self) -> LedgerResult<(usize, usize)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE);
        if limit == 0 || limit > MAX_PAGE {
            return Err(LedgerError::Validation(format!("limit must be between 1 and {}", MAX_PAGE)));
        }
        Ok((limit, self.offset.unwrap_or(0)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParkingBookings {
    pub bookings: Vec<Booking>,
    pub total: usize,
    pub has_more: bool,
    pub stats: BookingStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParkingSpot {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub distance_km: Option<f64>,
}

/// Read side. Nothing here writes.
pub struct BookingQueries {
    store: Arc<dyn Store>,
}

impl BookingQueries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Visible to the booking's creator and to the owner of its lot.
    pub async fn get_booking(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<Booking> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("booking", booking_id))?;
        if booking.user_id == caller.account_id {
            return Ok(booking);
        }

        let lot = self.get_parking(booking.parking_id).await?;
        if lot.owner_id == caller.account_id {
            Ok(booking)
        } else {
            Err(LedgerError::Authorization)
        }
    }

    pub async fn my_bookings(&self, caller: &Caller, page: &PageRequest) -> LedgerResult<BookingPage> {
        let (limit, offset) = page.resolve()?;
        let slice = self
            .store
            .list_bookings(&BookingQuery {
                user_id: Some(caller.account_id),
                parking_id: None,
                status: page.status,
                limit,
                offset,
            })
            .await?;

        Ok(BookingPage {
            has_more: offset + slice.items.len() < slice.total,
            total: slice.total,
            bookings: slice.items,
        })
    }

    pub async fn parking_bookings(
        &self,
        caller: &Caller,
        parking_id: Uuid,
        page: &PageRequest,
    ) -> LedgerResult<ParkingBookings> {
        let lot = self.get_parking(parking_id).await?;
        if lot.owner_id != caller.account_id {
            return Err(LedgerError::Authorization);
        }

        let (limit, offset) = page.resolve()?;
        let slice = self
            .store
            .list_bookings(&BookingQuery {
                user_id: None,
                parking_id: Some(parking_id),
                status: page.status,
                limit,
                offset,
            })
            .await?;
        let stats = self.store.booking_stats(parking_id, Utc::now().date_naive()).await?;

        Ok(ParkingBookings {
            has_more: offset + slice.items.len() < slice.total,
            total: slice.total,
            bookings: slice.items,
            stats,
        })
    }

    pub async fn get_parking(&self, parking_id: Uuid) -> LedgerResult<ParkingLot> {
        self.store
            .find_parking(parking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("parking", parking_id))
    }

    /// Name/address match over active lots, nearest first when a position is given.
    pub async fn search_parking(&self, query: &str, position: Option<(f64, f64)>) -> LedgerResult<Vec<ParkingSpot>> {
        let lots = self.store.search_parkings(query).await?;
        let mut spots: Vec<ParkingSpot> = lots
            .into_iter()
            .map(|lot| {
                let distance_km = position
                    .zip(lot.coordinates())
                    .map(|(from, to)| haversine_km(from, to));
                ParkingSpot { lot, distance_km }
            })
            .collect();

        if position.is_some() {
            // Lots without coordinates go last.
            spots.sort_by(|a, b| match (a.distance_km, b.distance_km) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        Ok(spots)
    }
}

pub fn haversine_km((lat1, lng1): (f64, f64), (lat2, lng2): (f64, f64)) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

use chrono::Utc;
use parkir_core::{Booking, Message, Room};
use parkir_shared::models::events::{
    BookingUpdatedEvent, MessageReceivedEvent, Notification, NotificationEnvelope, RoomUpdatedEvent,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// In-process fan-out of ledger and chat events.
///
/// Delivery is best-effort: slow subscribers lag and lose events, and there is
/// no replay. Every envelope carries a hub-wide sequence so consumers can spot
/// the gap and fall back to the pull queries.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<NotificationEnvelope>,
    seq: Arc<AtomicU64>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEnvelope> {
        self.sender.subscribe()
    }

    /// Returns the sequence assigned to the notification.
    pub fn publish(&self, notification: Notification) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // No subscribers is not an error.
        let _ = self.sender.send(NotificationEnvelope { seq, notification });
        seq
    }

    pub fn booking_updated(&self, booking: &Booking) -> u64 {
        self.publish(Notification::BookingUpdated(BookingUpdatedEvent {
            booking_id: booking.id,
            user_id: booking.user_id,
            parking_id: booking.parking_id,
            status: booking.status.to_string(),
            timestamp: Utc::now().timestamp(),
        }))
    }

    pub fn message_received(&self, message: &Message) -> u64 {
        self.publish(Notification::MessageReceived(MessageReceivedEvent {
            room_id: message.room_id,
            message_id: message.id,
            sender_id: message.sender_id,
            message_seq: message.seq,
            client_message_id: message.client_message_id.clone(),
            content: message.content.clone(),
            timestamp: message.created_at.timestamp(),
        }))
    }

    /// One `room_updated` per participant.
    pub fn room_updated(&self, room: &Room) {
        for user_id in room.participants() {
            self.publish(Notification::RoomUpdated(RoomUpdatedEvent {
                room_id: room.id,
                user_id,
                last_message: room.last_message.clone(),
                timestamp: room.updated_at.timestamp(),
            }));
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkir_core::VehicleType;
    use uuid::Uuid;

    #[tokio::test]
    async fn sequences_increase_per_publish() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe();

        let booking = Booking::new(Uuid::new_v4(), Uuid::new_v4(), VehicleType::Car, Utc::now(), 1);
        let first = hub.booking_updated(&booking);
        let second = hub.booking_updated(&booking);
        assert_eq!(second, first + 1);

        assert_eq!(rx.recv().await.unwrap().seq, first);
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.seq, second);
        assert_eq!(envelope.notification.event_name(), "booking_updated");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let hub = NotificationHub::new(1);
        let room = Room::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        hub.room_updated(&room);
        assert_eq!(hub.publish(Notification::RoomUpdated(RoomUpdatedEvent {
            room_id: room.id,
            user_id: room.owner_id,
            last_message: None,
            timestamp: 0,
        })), 3);
    }
}

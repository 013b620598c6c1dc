use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingUpdatedEvent {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub parking_id: Uuid,
    pub status: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoomUpdatedEvent {
    pub room_id: Uuid,
    /// The participant this update is addressed to.
    pub user_id: Uuid,
    pub last_message: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessageReceivedEvent {
    pub room_id: Uuid,
    pub message_id: Uuid,
    pub sender_id: Uuid,
    /// Per-room message sequence, usable as a poll cursor.
    pub message_seq: u64,
    pub client_message_id: Option<String>,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    BookingUpdated(BookingUpdatedEvent),
    RoomUpdated(RoomUpdatedEvent),
    MessageReceived(MessageReceivedEvent),
}

impl Notification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::BookingUpdated(_) => "booking_updated",
            Notification::RoomUpdated(_) => "room_updated",
            Notification::MessageReceived(_) => "message_received",
        }
    }
}

/// A notification stamped with the hub-wide delivery sequence.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub notification: Notification,
}

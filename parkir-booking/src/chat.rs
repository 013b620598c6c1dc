use crate::notify::NotificationHub;
use parkir_core::repository::{ChatRepository, ParkingRepository};
use parkir_core::{Caller, LedgerError, LedgerResult, Message, Room, Store};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_CLIENT_ID_CHARS: usize = 64;

/// Seeker ↔ lot owner conversations.
pub struct ChatService {
    store: Arc<dyn Store>,
    notifications: NotificationHub,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationHub) -> Self {
        Self { store, notifications }
    }

    /// Get-or-create the caller's room with the owner of `parking_id`.
    pub async fn open_room(&self, caller: &Caller, parking_id: Uuid) -> LedgerResult<Room> {
        let lot = self
            .store
            .find_parking(parking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("parking", parking_id))?;
        if lot.owner_id == caller.account_id {
            return Err(LedgerError::Validation("cannot open a room on your own parking".into()));
        }

        self.store
            .find_or_create_room(parking_id, caller.account_id, lot.owner_id)
            .await
    }

    pub async fn send_message(
        &self,
        caller: &Caller,
        room_id: Uuid,
        content: &str,
        client_message_id: Option<&str>,
    ) -> LedgerResult<Message> {
        self.room_for_participant(caller, room_id).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(LedgerError::Validation("message must not be empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(LedgerError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        let client_message_id = client_message_id.map(str::trim).filter(|id| !id.is_empty());
        if client_message_id.is_some_and(|id| id.chars().count() > MAX_CLIENT_ID_CHARS) {
            return Err(LedgerError::Validation("client_message_id is too long".into()));
        }

        let (message, created) = self
            .store
            .append_message(room_id, caller.account_id, content, client_message_id)
            .await?;

        if created {
            self.notifications.message_received(&message);
            if let Some(room) = self.store.find_room(room_id).await? {
                self.notifications.room_updated(&room);
            }
        } else {
            debug!(room_id = %room_id, message_id = %message.id, "Duplicate send, returning stored message");
        }
        Ok(message)
    }

    pub async fn my_rooms(&self, caller: &Caller) -> LedgerResult<Vec<Room>> {
        self.store.rooms_for_user(caller.account_id).await
    }

    pub async fn room_messages(&self, caller: &Caller, room_id: Uuid, after_seq: Option<u64>) -> LedgerResult<Vec<Message>> {
        self.room_for_participant(caller, room_id).await?;
        self.store.messages(room_id, after_seq).await
    }

    pub async fn room_for_participant(&self, caller: &Caller, room_id: Uuid) -> LedgerResult<Room> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("room", room_id))?;
        if !room.has_participant(caller.account_id) {
            return Err(LedgerError::Authorization);
        }
        Ok(room)
    }
}

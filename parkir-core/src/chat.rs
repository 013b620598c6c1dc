use chrono::{DateTime, Utc};
use parkir_shared::sync::Correlated;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation between a seeker and the owner of one lot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub parking_id: Uuid,
    pub seeker_id: Uuid,
    pub owner_id: Uuid,
    pub last_message: Option<String>,
    pub last_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(parking_id: Uuid, seeker_id: Uuid, owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parking_id,
            seeker_id,
            owner_id,
            last_message: None,
            last_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, account_id: Uuid) -> bool {
        self.seeker_id == account_id || self.owner_id == account_id
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.seeker_id, self.owner_id]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub seq: u64,
    pub content: String,
    /// Correlation id echoed back so the sender can retire its optimistic copy.
    pub client_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Correlated for Message {
    fn entry_id(&self) -> Uuid {
        self.id
    }

    fn correlation_id(&self) -> Option<&str> {
        self.client_message_id.as_deref()
    }
}

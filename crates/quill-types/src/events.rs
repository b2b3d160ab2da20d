use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse};

/// Events pushed to an account's live gateway connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { account_id: Uuid, username: String },

    /// A notification was recorded for this account
    NotificationCreate(NotificationResponse),

    /// A direct message arrived
    MessageCreate(MessageResponse),

    /// The account's credit balance changed
    CreditUpdate { credit: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_with_type_and_data() {
        let event = GatewayEvent::CreditUpdate { credit: 42 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CreditUpdate");
        assert_eq!(json["data"]["credit"], 42);
    }
}

use serde::{Deserialize, Serialize};

/// A single chat message as stored under `messages/{channelId}/{id}`.
///
/// Messages are immutable once written; there is no update or delete path.
/// `created_at` is the sender's clock in milliseconds since the epoch, and
/// the store never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Message {
    /// Short human-readable form used in notification bodies: the text body,
    /// or "Image" for attachment-only messages.
    pub fn preview(&self) -> &str {
        self.message.as_deref().unwrap_or("Image")
    }
}

/// A named channel. The id is the store-assigned key under `channel/`;
/// the name is free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// The authenticated user for the current session.
///
/// Passed explicitly into every component that acts on the user's behalf;
/// there is no process-wide "current user".
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub id_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_field_names_are_camel_case() {
        let msg = Message {
            id: "-Nabc".into(),
            sender_id: "u1".into(),
            sender_name: "Ada".into(),
            message: Some("hello".into()),
            created_at: 1700000000000,
            sender_image: None,
            image_url: None,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["senderName"], "Ada");
        assert_eq!(json["createdAt"], 1700000000000_i64);
        // Absent optionals are omitted entirely, matching what the store holds.
        assert!(json.get("imageUrl").is_none());
        assert!(json.get("senderImage").is_none());
    }

    #[test]
    fn preview_falls_back_to_image_label() {
        let mut msg = Message {
            id: "m".into(),
            sender_id: "u".into(),
            sender_name: "n".into(),
            message: None,
            created_at: 0,
            sender_image: None,
            image_url: Some("https://example/img.jpg".into()),
        };
        assert_eq!(msg.preview(), "Image");

        msg.message = Some("hi".into());
        assert_eq!(msg.preview(), "hi");
    }
}

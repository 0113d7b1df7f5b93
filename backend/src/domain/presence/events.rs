//! Real-time event vocabulary.
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": {...}}`.
//! Event names are part of the client contract and intentionally keep their
//! mixed casing and spaces.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ContentType, ConversationId, Message, Notification, NotificationId, Username};

/// Commands a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Join {
        room: ConversationId,
        friend: String,
    },
    NewMessage {
        room: ConversationId,
        friend: String,
        message: String,
        content_type: ContentType,
    },
    /// `data` is an email address or a username.
    NewFriendRequest {
        data: String,
    },
    AcceptedRequest {
        friend: String,
        id: NotificationId,
    },
    GetFriendRequests,
    GetGeneralNotifications,
    MarkAsRead {
        id: NotificationId,
    },
    DeleteFriendRequest {
        id: NotificationId,
    },
    AllowedTrack {
        friend: String,
    },
    DisallowedTrack {
        friend: String,
    },
    VerifyToDelete {
        friend: String,
    },
    ReloadProfile {
        friend: String,
    },
    SendErrorMessage {
        message: String,
    },
    SendSuccessMessage {
        message: String,
    },
}

/// Reasons a frame could not be turned into a [`ClientCommand`].
#[derive(Debug)]
pub enum CommandParseError {
    Malformed(serde_json::Error),
    UnknownEvent(String),
    InvalidPayload {
        event: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(error) => write!(f, "malformed frame: {error}"),
            Self::UnknownEvent(event) => write!(f, "unknown event `{event}`"),
            Self::InvalidPayload { event, source } => {
                write!(f, "invalid payload for `{event}`: {source}")
            }
        }
    }
}

impl std::error::Error for CommandParseError {}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RoomPayload {
    room: ConversationId,
    friend: String,
}

#[derive(Deserialize)]
struct MessagePayload {
    room: ConversationId,
    friend: String,
    message: String,
    #[serde(default, rename = "contentType", alias = "content_type")]
    content_type: ContentType,
}

#[derive(Deserialize)]
struct DataPayload {
    data: String,
}

#[derive(Deserialize)]
struct AcceptPayload {
    friend: String,
    id: NotificationId,
}

#[derive(Deserialize)]
struct IdPayload {
    id: NotificationId,
}

#[derive(Deserialize)]
struct FriendPayload {
    friend: String,
}

#[derive(Deserialize)]
struct TextPayload {
    message: String,
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, CommandParseError> {
    serde_json::from_value(data).map_err(|source| CommandParseError::InvalidPayload {
        event: event.to_owned(),
        source,
    })
}

impl ClientCommand {
    /// Parse a text frame.
    ///
    /// # Examples
    /// ```
    /// use beacon::domain::presence::ClientCommand;
    ///
    /// let command = ClientCommand::parse(r#"{"event":"get_friend_requests"}"#).unwrap();
    /// assert_eq!(command, ClientCommand::GetFriendRequests);
    /// ```
    pub fn parse(text: &str) -> Result<Self, CommandParseError> {
        let Frame { event, data } =
            serde_json::from_str(text).map_err(CommandParseError::Malformed)?;
        let name = event.as_str();
        let command = match name {
            "join" => {
                let RoomPayload { room, friend } = payload(name, data)?;
                Self::Join { room, friend }
            }
            "newMessage" => {
                let MessagePayload {
                    room,
                    friend,
                    message,
                    content_type,
                } = payload(name, data)?;
                Self::NewMessage {
                    room,
                    friend,
                    message,
                    content_type,
                }
            }
            "new_friend_request" => {
                let DataPayload { data } = payload(name, data)?;
                Self::NewFriendRequest { data }
            }
            "accepted_request" => {
                let AcceptPayload { friend, id } = payload(name, data)?;
                Self::AcceptedRequest { friend, id }
            }
            "get_friend_requests" => Self::GetFriendRequests,
            "get_general_notifications" => Self::GetGeneralNotifications,
            "mark as read" => Self::MarkAsRead {
                id: payload::<IdPayload>(name, data)?.id,
            },
            "delete friend request" => Self::DeleteFriendRequest {
                id: payload::<IdPayload>(name, data)?.id,
            },
            "allowed track" => Self::AllowedTrack {
                friend: payload::<FriendPayload>(name, data)?.friend,
            },
            "disallowed track" => Self::DisallowedTrack {
                friend: payload::<FriendPayload>(name, data)?.friend,
            },
            "verify to delete" => Self::VerifyToDelete {
                friend: payload::<FriendPayload>(name, data)?.friend,
            },
            "reload profile" => Self::ReloadProfile {
                friend: payload::<FriendPayload>(name, data)?.friend,
            },
            "send error message" => Self::SendErrorMessage {
                message: payload::<TextPayload>(name, data)?.message,
            },
            "send success message" => Self::SendSuccessMessage {
                message: payload::<TextPayload>(name, data)?.message,
            },
            _ => return Err(CommandParseError::UnknownEvent(event)),
        };
        Ok(command)
    }

    /// Wire name of the command, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::NewMessage { .. } => "newMessage",
            Self::NewFriendRequest { .. } => "new_friend_request",
            Self::AcceptedRequest { .. } => "accepted_request",
            Self::GetFriendRequests => "get_friend_requests",
            Self::GetGeneralNotifications => "get_general_notifications",
            Self::MarkAsRead { .. } => "mark as read",
            Self::DeleteFriendRequest { .. } => "delete friend request",
            Self::AllowedTrack { .. } => "allowed track",
            Self::DisallowedTrack { .. } => "disallowed track",
            Self::VerifyToDelete { .. } => "verify to delete",
            Self::ReloadProfile { .. } => "reload profile",
            Self::SendErrorMessage { .. } => "send error message",
            Self::SendSuccessMessage { .. } => "send success message",
        }
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "prevMessages")]
    PrevMessages { messages: Vec<Message> },
    #[serde(rename = "chat")]
    Chat { message: Message, sender: Username },
    /// Something new is waiting in the recipient's notification log.
    #[serde(rename = "alert_user")]
    AlertUser,
    #[serde(rename = "success")]
    Success { message: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "reload_general_notification")]
    ReloadGeneralNotification,
    #[serde(rename = "reload_friend_request")]
    ReloadFriendRequest,
    #[serde(rename = "user_friend_requests")]
    UserFriendRequests { data: Vec<Notification> },
    #[serde(rename = "show_general_notifications")]
    ShowGeneralNotifications { data: Vec<Notification> },
    #[serde(rename = "blurr read")]
    BlurrRead { id: NotificationId },
    #[serde(rename = "profile reload")]
    ProfileReload,
}

impl ServerEvent {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

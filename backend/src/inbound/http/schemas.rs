//! Response and request bodies shared across handler modules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Avatar, Email, FriendSummary, GeoJsonPoint, GeoPoint, TrackGrant, TrackGrantee, User, UserId,
    Username,
};

/// Public view of a user: everything except the password hash, the session
/// token and the reset token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub username: Username,
    pub full_name: String,
    pub email: Email,
    pub avatar: Avatar,
    #[schema(value_type = Option<GeoJsonPoint>)]
    pub location: Option<GeoPoint>,
    pub friends: BTreeMap<UserId, FriendSummary>,
    pub allowed_tracks: BTreeMap<UserId, TrackGrant>,
    pub tracking_me: BTreeMap<UserId, TrackGrantee>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            location: user.location,
            friends: user.friends.clone(),
            allowed_tracks: user.allowed_tracks.clone(),
            tracking_me: user.tracking_me.clone(),
            last_seen: user.last_seen,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Body naming a single friend, by username unless stated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FriendRequest {
    #[schema(example = "bob")]
    pub friend: String,
}

/// Plain acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "success")]
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer; repositories convert them
//! to domain values and validate them on the way out.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    allowed_tracks, conversation_presence, conversations, friends, messages, tracking_me, users,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub session_token: Option<Uuid>,
    pub reset_token: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub full_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub avatar: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub session_token: Option<Uuid>,
    pub reset_token: Option<&'a str>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Relationship entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = friends)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FriendRow {
    pub owner_id: Uuid,
    pub friend_id: Uuid,
    pub username: String,
    pub avatar: String,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = allowed_tracks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AllowedTrackRow {
    pub owner_id: Uuid,
    pub granter_id: Uuid,
    pub username: String,
    pub avatar: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tracking_me)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TrackingMeRow {
    pub owner_id: Uuid,
    pub grantee_id: Uuid,
    pub username: String,
    pub avatar: String,
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ConversationRow {
    pub id: Uuid,
    pub participant_low: Uuid,
    pub participant_high: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub content_type: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = conversation_presence)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PresenceRow {
    pub conversation_id: Uuid,
    pub username: String,
    pub in_chat: bool,
}

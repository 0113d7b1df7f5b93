//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// User accounts. Username, email and session token are unique.
    users (id) {
        id -> Uuid,
        username -> Varchar,
        full_name -> Text,
        /// Lower-cased on the way in.
        email -> Text,
        password_hash -> Text,
        avatar -> Text,
        /// Both coordinates are set or both are null.
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        session_token -> Nullable<Uuid>,
        reset_token -> Nullable<Text>,
        last_seen -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Cached friend summaries owned by `owner_id`.
    friends (owner_id, friend_id) {
        owner_id -> Uuid,
        friend_id -> Uuid,
        username -> Varchar,
        avatar -> Text,
        last_seen -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Users who let `owner_id` see their location.
    allowed_tracks (owner_id, granter_id) {
        owner_id -> Uuid,
        granter_id -> Uuid,
        username -> Varchar,
        avatar -> Text,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
    }
}

diesel::table! {
    /// Users `owner_id` lets see their location.
    tracking_me (owner_id, grantee_id) {
        owner_id -> Uuid,
        grantee_id -> Uuid,
        username -> Varchar,
        avatar -> Text,
    }
}

diesel::table! {
    /// One row per participant pair, lower id first.
    conversations (id) {
        id -> Uuid,
        participant_low -> Uuid,
        participant_high -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Uuid,
        /// Insertion order within the table.
        position -> Int8,
        conversation_id -> Uuid,
        sender -> Varchar,
        receiver -> Varchar,
        content -> Text,
        content_type -> Varchar,
        read -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-participant "currently viewing this chat" flags.
    conversation_presence (conversation_id, username) {
        conversation_id -> Uuid,
        username -> Varchar,
        in_chat -> Bool,
    }
}

diesel::joinable!(friends -> users (owner_id));
diesel::joinable!(allowed_tracks -> users (owner_id));
diesel::joinable!(tracking_me -> users (owner_id));
diesel::joinable!(messages -> conversations (conversation_id));
diesel::joinable!(conversation_presence -> conversations (conversation_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    friends,
    allowed_tracks,
    tracking_me,
    conversations,
    messages,
    conversation_presence,
);

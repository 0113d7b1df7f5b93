//! Conversation history and "currently in chat" flags.

use actix_web::{post, web};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::domain::{ConversationId, Error, Message, MessageId, PresenceUpdate};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::CurrentUser;
use crate::inbound::http::friends::require_named_user;
use crate::inbound::http::schemas::{FriendRequest, StatusResponse};
use crate::inbound::http::state::HttpState;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MarkReadRequest {
    pub conversation_id: ConversationId,
    pub messages: Vec<MessageId>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MarkReadResponse {
    #[schema(example = "messages updated")]
    pub status: String,
    pub updated: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PresenceRequest {
    /// Friend whose chat the caller opened or left. When absent or not a
    /// mutual friend, every flag of the caller is cleared.
    #[serde(default)]
    pub friend: Option<String>,
    pub status: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct InChatResponse {
    pub status: bool,
}

/// Open the conversation with a user, creating it on first use.
#[utoipa::path(
    post,
    path = "/api/user/friend/conversation",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Conversation history", body = ConversationResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["conversations"],
    operation_id = "openConversation"
)]
#[post("/friend/conversation")]
pub async fn open_conversation(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<ConversationResponse>> {
    let friend = require_named_user(&state, &payload.friend).await?;
    let conversation = state
        .conversations
        .find_or_create(&current, &friend)
        .await?;
    Ok(web::Json(ConversationResponse {
        conversation_id: conversation.id,
        messages: conversation.messages,
    }))
}

/// Mark messages of a conversation the caller takes part in as read.
#[utoipa::path(
    post,
    path = "/api/user/friend/conversation/read",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Messages updated", body = MarkReadResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Not a participant", body = Error),
        (status = 404, description = "Unknown conversation", body = Error)
    ),
    tags = ["conversations"],
    operation_id = "markMessagesRead"
)]
#[post("/friend/conversation/read")]
pub async fn mark_read(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<MarkReadRequest>,
) -> ApiResult<web::Json<MarkReadResponse>> {
    let MarkReadRequest {
        conversation_id,
        messages,
    } = payload.into_inner();
    if messages.is_empty() {
        return Err(Error::invalid_request("No messages to mark as read"));
    }
    let conversation = state
        .conversations
        .find(&conversation_id)
        .await?
        .ok_or_else(|| Error::not_found("Conversation not found"))?;
    if !conversation.participants.contains(&current.id) {
        return Err(Error::forbidden("Not a participant of this conversation"));
    }
    let updated = state
        .conversations
        .mark_many_read(&conversation_id, &messages)
        .await?;
    Ok(web::Json(MarkReadResponse {
        status: "messages updated".to_owned(),
        updated,
    }))
}

/// Record whether the caller is viewing the chat with `friend`.
#[utoipa::path(
    post,
    path = "/api/user/isInChat/update",
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Flag written or all flags cleared", body = StatusResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["conversations"],
    operation_id = "updateInChat"
)]
#[post("/isInChat/update")]
pub async fn update_in_chat(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<PresenceRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let PresenceRequest { friend, status } = payload.into_inner();
    let friend = match friend.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => state.relationships.find_by_username(name).await?,
        _ => None,
    };
    let outcome = state
        .conversations
        .update_presence(&current, friend.as_ref(), status)
        .await?;
    debug!(user_id = %current.id, ?outcome, "presence updated");
    let status = match outcome {
        PresenceUpdate::Updated => "success",
        PresenceUpdate::ClearedAll => "All set to false",
    };
    Ok(web::Json(StatusResponse::new(status)))
}

/// Whether `friend` currently has their chat with the caller open.
#[utoipa::path(
    post,
    path = "/api/user/isInChat",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Friend's flag", body = InChatResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["conversations"],
    operation_id = "friendInChat"
)]
#[post("/isInChat")]
pub async fn friend_in_chat(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<InChatResponse>> {
    let friend = require_named_user(&state, &payload.friend).await?;
    let status = state
        .conversations
        .friend_in_chat(&current, &friend)
        .await?;
    Ok(web::Json(InChatResponse { status }))
}

#[cfg(test)]
#[path = "conversations_tests.rs"]
mod tests;

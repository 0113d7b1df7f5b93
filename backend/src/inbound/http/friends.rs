//! Friend list, location sharing and user search handlers.
//!
//! Friends are named by username in request bodies; `/friends/remove` also
//! accepts a user id so stale entries whose username changed can be dropped.

use std::collections::BTreeMap;

use actix_web::{delete, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Error, FriendOverview, GeoJsonPoint, GeoPoint, ReconcileReport, SearchResult, TrackGrant,
    TrackGrantee, User, UserId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::CurrentUser;
use crate::inbound::http::schemas::{FriendRequest, StatusResponse};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FRIEND, QUERY, require_text};

const INVALID_FRIEND: &str = "Invalid friend";

/// Resolve the user named by a `friend` field.
pub(crate) async fn require_named_user(state: &HttpState, raw: &str) -> Result<User, Error> {
    let username = require_text(FRIEND, raw)?;
    state
        .relationships
        .find_by_username(&username)
        .await?
        .ok_or_else(|| Error::invalid_request(INVALID_FRIEND))
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RemoveFriendResponse {
    #[schema(example = "friend removed")]
    pub status: String,
    pub friend_id: UserId,
}

/// Users who let the caller see their location.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AllowedTracksResponse {
    pub friends: BTreeMap<UserId, TrackGrant>,
}

/// Users the caller lets see their location.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TrackingMeResponse {
    pub friends: BTreeMap<UserId, TrackGrantee>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SearchRequest {
    #[schema(example = "ada")]
    pub query: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LocationResponse {
    #[schema(value_type = GeoJsonPoint)]
    pub location: GeoPoint,
}

/// Friends of the caller, each flagged with whether unread messages from
/// them are waiting.
#[utoipa::path(
    get,
    path = "/api/user/friends",
    responses(
        (status = 200, description = "Friends", body = [FriendOverview]),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "listFriends"
)]
#[get("/friends")]
pub async fn list_friends(
    state: web::Data<HttpState>,
    current: CurrentUser,
) -> ApiResult<web::Json<Vec<FriendOverview>>> {
    let overview = state.relationships.friends_overview(&current.id).await?;
    Ok(web::Json(overview))
}

#[utoipa::path(
    post,
    path = "/api/user/friends/new",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Friend added", body = StatusResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "addFriend"
)]
#[post("/friends/new")]
pub async fn add_friend(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let friend = require_named_user(&state, &payload.friend).await?;
    state
        .relationships
        .add_friend(&current.id, &friend.id)
        .await?;
    Ok(web::Json(StatusResponse::new("friend added")))
}

/// Drop a friend by username or id. Only the caller's side is changed.
#[utoipa::path(
    delete,
    path = "/api/user/friends/remove",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Friend removed", body = RemoveFriendResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "removeFriend"
)]
#[delete("/friends/remove")]
pub async fn remove_friend(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<RemoveFriendResponse>> {
    let reference = require_text(FRIEND, &payload.friend)?;
    let friend_id = state
        .relationships
        .remove_friend(&current.id, &reference)
        .await?;
    Ok(web::Json(RemoveFriendResponse {
        status: "friend removed".to_owned(),
        friend_id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/user/friends/allow_track",
    responses(
        (status = 200, description = "Friends the caller can track", body = AllowedTracksResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "listAllowedTracks"
)]
#[get("/friends/allow_track")]
pub async fn list_allowed_tracks(current: CurrentUser) -> web::Json<AllowedTracksResponse> {
    web::Json(AllowedTracksResponse {
        friends: current.into_inner().allowed_tracks,
    })
}

/// Let a friend see the caller's location.
#[utoipa::path(
    post,
    path = "/api/user/friends/allow_track",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Track permission allowed", body = StatusResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "allowTrack"
)]
#[post("/friends/allow_track")]
pub async fn allow_track(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let friend = require_named_user(&state, &payload.friend).await?;
    state
        .relationships
        .allow_track(&current.id, &friend.id)
        .await?;
    Ok(web::Json(StatusResponse::new("Track permission allowed")))
}

#[utoipa::path(
    get,
    path = "/api/user/friends/tracking_me",
    responses(
        (status = 200, description = "Friends tracking the caller", body = TrackingMeResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "listTrackingMe"
)]
#[get("/friends/tracking_me")]
pub async fn tracking_me(current: CurrentUser) -> web::Json<TrackingMeResponse> {
    web::Json(TrackingMeResponse {
        friends: current.into_inner().tracking_me,
    })
}

/// Withdraw a friend's permission to see the caller's location.
#[utoipa::path(
    post,
    path = "/api/user/friends/disallow_track",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Track permission disallowed", body = StatusResponse),
        (status = 400, description = "Invalid friend", body = Error),
        (status = 404, description = "Friend could not track the caller", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "disallowTrack"
)]
#[post("/friends/disallow_track")]
pub async fn disallow_track(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let friend = require_named_user(&state, &payload.friend).await?;
    state
        .relationships
        .revoke_track(&current.id, &friend.id)
        .await?;
    Ok(web::Json(StatusResponse::new("Track permission disallowed")))
}

#[utoipa::path(
    post,
    path = "/api/user/friends/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matching users", body = [SearchResult]),
        (status = 400, description = "Empty or invalid search query", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "searchUsers"
)]
#[post("/friends/search")]
pub async fn search(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<SearchRequest>,
) -> ApiResult<web::Json<Vec<SearchResult>>> {
    let query = require_text(QUERY, &payload.query)?;
    let results = state.relationships.search(&current.id, &query).await?;
    Ok(web::Json(results))
}

/// Repair the caller's friend and grant entries against the live records.
#[utoipa::path(
    post,
    path = "/api/user/friends/reconcile",
    responses(
        (status = 200, description = "Repairs applied", body = ReconcileReport),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "reconcileFriends"
)]
#[post("/friends/reconcile")]
pub async fn reconcile(
    state: web::Data<HttpState>,
    current: CurrentUser,
) -> ApiResult<web::Json<ReconcileReport>> {
    let report = state.relationships.reconcile(&current.id).await?;
    Ok(web::Json(report))
}

/// Location of a friend who granted the caller tracking access.
#[utoipa::path(
    post,
    path = "/api/user/friend/current_location",
    request_body = FriendRequest,
    responses(
        (status = 200, description = "Friend location", body = LocationResponse),
        (status = 400, description = "Invalid friend or no track access", body = Error),
        (status = 404, description = "Friend has no location", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["friends"],
    operation_id = "friendLocation"
)]
#[post("/friend/current_location")]
pub async fn friend_location(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<FriendRequest>,
) -> ApiResult<web::Json<LocationResponse>> {
    let friend = require_text(FRIEND, &payload.friend)?;
    let location = state
        .relationships
        .friend_location(&current.id, &friend)
        .await?;
    Ok(web::Json(LocationResponse { location }))
}

#[cfg(test)]
#[path = "friends_tests.rs"]
mod tests;

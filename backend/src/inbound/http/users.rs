//! Account handlers: registration, login, password reset, and the caller's
//! own profile and location.
//!
//! ```text
//! POST /api/user/signup {"full_name":"Ada","username":"ada","email":"ada@example.com","password":"pw"}
//! POST /api/user/login {"email":"ada@example.com","password":"pw"}
//! GET /api/user/user_info
//! ```

use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::domain::{
    Avatar, Email, Error, GeoPoint, LoginCredentials, ProfileUpdate, Registration, SessionToken,
    UserValidationError, Username,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::CurrentUser;
use crate::inbound::http::schemas::{StatusResponse, UserResponse};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{map_login_validation_error, map_user_validation_error};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SignupRequest {
    #[schema(example = "Ada Lovelace")]
    pub full_name: String,
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
}

/// Successful login: the bearer token for non-cookie clients plus the user.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: SessionToken,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ResetTokenRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ResetTokenResponse {
    #[schema(example = "3fa85f64")]
    pub reset_token: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub reset_token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LocationRequest {
    #[schema(example = 51.5)]
    pub latitude: f64,
    #[schema(example = -0.12)]
    pub longitude: f64,
}

/// Partial profile change. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct ProfileRequest {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar: Option<String>,
}

impl TryFrom<ProfileRequest> for ProfileUpdate {
    type Error = Error;

    fn try_from(value: ProfileRequest) -> Result<Self, Self::Error> {
        let username = value
            .username
            .map(|raw| Username::new(raw.trim()))
            .transpose()
            .map_err(map_user_validation_error)?;
        let full_name = match value.full_name.map(|raw| raw.trim().to_owned()) {
            Some(name) if name.is_empty() => {
                return Err(map_user_validation_error(UserValidationError::EmptyFullName));
            }
            other => other,
        };
        let avatar = value
            .avatar
            .map(Avatar::new)
            .transpose()
            .map_err(map_user_validation_error)?;
        Ok(Self {
            username,
            full_name,
            avatar,
        })
    }
}

/// Register a new account.
#[utoipa::path(
    post,
    path = "/api/user/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 409, description = "Username or email taken", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["users"],
    operation_id = "signup",
    security([])
)]
#[post("/signup")]
pub async fn signup(
    state: web::Data<HttpState>,
    payload: web::Json<SignupRequest>,
) -> ApiResult<HttpResponse> {
    let SignupRequest {
        full_name,
        username,
        email,
        password,
    } = payload.into_inner();
    let registration = Registration::try_from_parts(&full_name, &username, &email, &password)
        .map_err(map_login_validation_error)?;
    let user = state.relationships.register(&registration).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// Authenticate, establish the cookie session and return a fresh token.
#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login success", body = LoginResponse,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Invalid credentials", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["users"],
    operation_id = "login",
    security([])
)]
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginRequest>,
) -> ApiResult<web::Json<LoginResponse>> {
    let LoginRequest { email, password } = payload.into_inner();
    let credentials =
        LoginCredentials::try_from_parts(&email, &password).map_err(map_login_validation_error)?;
    let (token, user) = state.auth.login(&credentials).await?;
    session.persist_user(&user.id)?;
    if let Err(error) = state
        .notifications
        .sweep(&user.id, state.retention_days)
        .await
    {
        warn!(user_id = %user.id, error = %error, "retention sweep failed");
    }
    Ok(web::Json(LoginResponse {
        token,
        user: UserResponse::from(&user),
    }))
}

/// Revoke the session token and drop the cookie session.
#[utoipa::path(
    post,
    path = "/api/user/logout",
    responses(
        (status = 200, description = "Logged out", body = StatusResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["users"],
    operation_id = "logout"
)]
#[post("/logout")]
pub async fn logout(
    state: web::Data<HttpState>,
    current: CurrentUser,
    session: SessionContext,
) -> ApiResult<web::Json<StatusResponse>> {
    state.auth.logout(&current.id).await?;
    session.clear();
    Ok(web::Json(StatusResponse::new("logged out")))
}

/// Issue a password reset token for the account behind `email`.
#[utoipa::path(
    post,
    path = "/api/user/password/reset_token",
    request_body = ResetTokenRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ResetTokenResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 404, description = "No such account", body = Error)
    ),
    tags = ["users"],
    operation_id = "issueResetToken",
    security([])
)]
#[post("/password/reset_token")]
pub async fn issue_reset_token(
    state: web::Data<HttpState>,
    payload: web::Json<ResetTokenRequest>,
) -> ApiResult<web::Json<ResetTokenResponse>> {
    let email = Email::new(payload.email.as_str()).map_err(map_user_validation_error)?;
    let reset_token = state.auth.issue_reset_token(&email).await?;
    Ok(web::Json(ResetTokenResponse { reset_token }))
}

/// Replace the password using a previously issued reset token.
#[utoipa::path(
    post,
    path = "/api/user/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = StatusResponse),
        (status = 400, description = "Invalid or expired token", body = Error)
    ),
    tags = ["users"],
    operation_id = "resetPassword",
    security([])
)]
#[post("/password/reset")]
pub async fn reset_password(
    state: web::Data<HttpState>,
    payload: web::Json<ResetPasswordRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let ResetPasswordRequest {
        email,
        reset_token,
        password,
    } = payload.into_inner();
    let email = Email::new(email).map_err(map_user_validation_error)?;
    state
        .auth
        .reset_password(&email, &reset_token, &password)
        .await?;
    Ok(web::Json(StatusResponse::new("password updated")))
}

/// The authenticated user.
#[utoipa::path(
    get,
    path = "/api/user/user_info",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["users"],
    operation_id = "currentUser"
)]
#[get("/user_info")]
pub async fn user_info(current: CurrentUser) -> web::Json<UserResponse> {
    web::Json(UserResponse::from(&*current))
}

#[utoipa::path(
    post,
    path = "/api/user/update_location",
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Location stored", body = StatusResponse),
        (status = 400, description = "Coordinates out of range", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["users"],
    operation_id = "updateLocation"
)]
#[post("/update_location")]
pub async fn update_location(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<LocationRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let point =
        GeoPoint::new(payload.latitude, payload.longitude).map_err(map_user_validation_error)?;
    state
        .relationships
        .update_location(&current.id, point)
        .await?;
    Ok(web::Json(StatusResponse::new("success")))
}

#[utoipa::path(
    delete,
    path = "/api/user/location",
    responses(
        (status = 200, description = "Location cleared", body = StatusResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["users"],
    operation_id = "clearLocation"
)]
#[delete("/location")]
pub async fn clear_location(
    state: web::Data<HttpState>,
    current: CurrentUser,
) -> ApiResult<web::Json<StatusResponse>> {
    state.relationships.clear_location(&current.id).await?;
    Ok(web::Json(StatusResponse::new("success")))
}

/// Change username, full name or avatar. Friends' cached copies are
/// refreshed when the username or avatar changes.
#[utoipa::path(
    post,
    path = "/api/user/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 409, description = "Username taken", body = Error)
    ),
    tags = ["users"],
    operation_id = "updateProfile"
)]
#[post("/profile")]
pub async fn update_profile(
    state: web::Data<HttpState>,
    current: CurrentUser,
    payload: web::Json<ProfileRequest>,
) -> ApiResult<web::Json<UserResponse>> {
    let changes = ProfileUpdate::try_from(payload.into_inner())?;
    let user = state
        .relationships
        .update_profile(&current.id, changes)
        .await?;
    Ok(web::Json(UserResponse::from(&user)))
}

/// Delete the caller's account and everything hanging off it.
#[utoipa::path(
    delete,
    path = "/api/user/remove",
    responses(
        (status = 200, description = "Account deleted", body = StatusResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["users"],
    operation_id = "deleteAccount"
)]
#[delete("/remove")]
pub async fn remove_account(
    state: web::Data<HttpState>,
    current: CurrentUser,
    session: SessionContext,
) -> ApiResult<web::Json<StatusResponse>> {
    state.relationships.delete_account(&current.id).await?;
    session.clear();
    Ok(web::Json(StatusResponse::new("account deleted")))
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;

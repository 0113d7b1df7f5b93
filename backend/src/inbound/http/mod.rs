//! HTTP inbound adapter exposing the `/api/user` REST surface.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod friends;
pub mod health;
pub mod schemas;
pub mod session;
pub mod session_config;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod users;
pub mod validation;

use actix_web::{Scope, web};

pub use error::{ApiResult, json_config};

/// Every `/api/user` route. Callers wrap the scope in session middleware
/// and register [`state::HttpState`] as app data.
pub fn api_scope() -> Scope {
    web::scope("/api/user")
        .service(users::signup)
        .service(users::login)
        .service(users::logout)
        .service(users::issue_reset_token)
        .service(users::reset_password)
        .service(users::user_info)
        .service(users::update_location)
        .service(users::clear_location)
        .service(users::update_profile)
        .service(users::remove_account)
        .service(friends::list_friends)
        .service(friends::add_friend)
        .service(friends::remove_friend)
        .service(friends::list_allowed_tracks)
        .service(friends::allow_track)
        .service(friends::tracking_me)
        .service(friends::disallow_track)
        .service(friends::search)
        .service(friends::reconcile)
        .service(friends::friend_location)
        .service(conversations::open_conversation)
        .service(conversations::mark_read)
        .service(conversations::update_in_chat)
        .service(conversations::friend_in_chat)
}

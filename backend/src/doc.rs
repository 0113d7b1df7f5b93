//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every `/api/user` handler plus the health probes.
//! Request and response schemas are collected from the handler annotations.
//! Two security schemes are declared: the `session` cookie set by
//! `POST /api/user/login` and a bearer header carrying the session token.
//!
//! The generated OpenAPI document is used by Swagger UI (debug builds) and
//! exported via `cargo run --bin openapi-dump` for external tooling.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{Error, ErrorCode};
use crate::inbound::http::{conversations, friends, health, users};

/// Enrich the generated document with the session security schemes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Session cookie issued by POST /api/user/login.",
            ))),
        );
        components.add_security_scheme(
            "SessionToken",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Session token returned by POST /api/user/login."))
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the REST API.
/// Swagger UI is enabled in debug builds only and used by tooling.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Beacon API",
        description = "Accounts, friends, location sharing and conversations."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = []), ("SessionToken" = [])),
    paths(
        users::signup,
        users::login,
        users::logout,
        users::issue_reset_token,
        users::reset_password,
        users::user_info,
        users::update_location,
        users::clear_location,
        users::update_profile,
        users::remove_account,
        friends::list_friends,
        friends::add_friend,
        friends::remove_friend,
        friends::list_allowed_tracks,
        friends::allow_track,
        friends::tracking_me,
        friends::disallow_track,
        friends::search,
        friends::reconcile,
        friends::friend_location,
        conversations::open_conversation,
        conversations::mark_read,
        conversations::update_in_chat,
        conversations::friend_in_chat,
        health::ready,
        health::live,
    ),
    components(schemas(Error, ErrorCode)),
    tags(
        (name = "users", description = "Registration, login and the caller's own profile"),
        (name = "friends", description = "Friend lists, search and location sharing"),
        (name = "conversations", description = "Conversation history and chat presence"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

//! Domain primitives, aggregates, and services.
//!
//! Purpose: Define strongly typed domain entities used by the API and
//! persistence layers, and the services that mutate them through ports.
//! Keep types immutable where possible and document invariants and
//! serialisation contracts (serde) in each type's Rustdoc.
//!
//! Public surface:
//! - Error, ErrorCode: transport-agnostic failure payload.
//! - User, UserUpdate and relationship summaries.
//! - Conversation, Message, and the participant pair key.
//! - Notification and its append outcome.
//! - Services: [`RelationshipService`], [`ConversationService`],
//!   [`NotificationService`], [`AuthGate`].
//! - [`presence`]: room router and real-time event dispatcher.

pub mod auth;
pub mod auth_gate;
pub mod conversation;
pub mod conversation_service;
pub mod error;
pub mod notification;
pub mod notification_service;
pub mod ports;
pub mod presence;
pub mod relationship_service;
mod service_support;
pub mod trace_id;
pub mod user;

pub use self::auth::{
    LoginCredentials, LoginValidationError, RESET_TOKEN_LEN, Registration, SessionToken,
    generate_reset_token,
};
pub use self::auth_gate::{AuthGate, IdentityClaim};
pub use self::conversation::{
    ContentType, Conversation, ConversationId, Message, MessageId, ParticipantPair,
};
pub use self::conversation_service::{ConversationService, PresenceUpdate};
pub use self::error::{Error, ErrorCode, ErrorValidationError, TRACE_ID_HEADER};
pub use self::notification::{
    AppendOutcome, NewNotification, Notification, NotificationId, NotificationKind,
};
pub use self::notification_service::{
    CONNECT_SWEEP_DAYS, DEFAULT_RETENTION_DAYS, NotificationService,
};
pub use self::relationship_service::{
    FriendOverview, ProfileUpdate, ReconcileReport, RelationshipService, SEARCH_LIMIT,
    SearchResult,
};
pub use self::trace_id::TraceId;
pub use self::user::{
    Avatar, DEFAULT_AVATAR, Email, FriendSummary, GeoJsonPoint, GeoPoint, TrackGrant,
    TrackGrantee, USERNAME_MAX, USERNAME_MIN, User, UserId, UserUpdate, UserValidationError,
    Username, looks_like_email,
};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use beacon::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;

//! User aggregate, relationship summaries, and the closed set of user updates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::SessionToken;

/// Validation errors returned by the user value constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    EmptyId,
    InvalidId,
    UsernameTooShort { min: usize },
    UsernameTooLong { max: usize },
    UsernameInvalidCharacters,
    InvalidEmail,
    EmptyFullName,
    EmptyAvatar,
    LatitudeOutOfRange,
    LongitudeOutOfRange,
}

impl fmt::Display for UserValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => write!(f, "user id must not be empty"),
            Self::InvalidId => write!(f, "user id must be a valid UUID"),
            Self::UsernameTooShort { min } => {
                write!(f, "username must be at least {min} characters")
            }
            Self::UsernameTooLong { max } => {
                write!(f, "username must be at most {max} characters")
            }
            Self::UsernameInvalidCharacters => write!(
                f,
                "username may only contain letters, numbers, dots, dashes, or underscores",
            ),
            Self::InvalidEmail => write!(f, "email address is not valid"),
            Self::EmptyFullName => write!(f, "full name must not be empty"),
            Self::EmptyAvatar => write!(f, "avatar path must not be empty"),
            Self::LatitudeOutOfRange => write!(f, "latitude must be between -90 and 90"),
            Self::LongitudeOutOfRange => write!(f, "longitude must be between -180 and 180"),
        }
    }
}

impl std::error::Error for UserValidationError {}

/// Stable user identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = String, example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
pub struct UserId(Uuid);

impl UserId {
    /// Validate and construct a [`UserId`] from a string.
    pub fn new(id: impl AsRef<str>) -> Result<Self, UserValidationError> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(UserValidationError::EmptyId);
        }
        if id.trim() != id {
            return Err(UserValidationError::InvalidId);
        }
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| UserValidationError::InvalidId)
    }

    /// Generate a new random [`UserId`].
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an already-parsed UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Minimum allowed length for a username.
pub const USERNAME_MIN: usize = 3;
/// Maximum allowed length for a username.
pub const USERNAME_MAX: usize = 32;

static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn username_regex() -> &'static Regex {
    USERNAME_RE.get_or_init(|| {
        Regex::new("^[A-Za-z0-9_.-]+$")
            .unwrap_or_else(|error| panic!("username regex failed to compile: {error}"))
    })
}

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

/// Returns true when `raw` looks like an email address rather than a username.
#[must_use]
pub fn looks_like_email(raw: &str) -> bool {
    email_regex().is_match(raw.trim())
}

/// Unique public handle of a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "bob")]
pub struct Username(String);

impl Username {
    /// Validate and construct a [`Username`].
    pub fn new(raw: impl Into<String>) -> Result<Self, UserValidationError> {
        let raw = raw.into();
        let length = raw.chars().count();
        if length < USERNAME_MIN {
            return Err(UserValidationError::UsernameTooShort { min: USERNAME_MIN });
        }
        if length > USERNAME_MAX {
            return Err(UserValidationError::UsernameTooLong { max: USERNAME_MAX });
        }
        if !username_regex().is_match(&raw) {
            return Err(UserValidationError::UsernameInvalidCharacters);
        }
        Ok(Self(raw))
    }

    /// Borrow the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl TryFrom<String> for Username {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Email address, normalised to lowercase so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "bob@example.com")]
pub struct Email(String);

impl Email {
    /// Validate, trim, and lowercase an email address.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, UserValidationError> {
        let normalised = raw.as_ref().trim().to_lowercase();
        if !email_regex().is_match(&normalised) {
            return Err(UserValidationError::InvalidEmail);
        }
        Ok(Self(normalised))
    }

    /// Borrow the normalised address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl TryFrom<String> for Email {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Avatar assigned to accounts that never uploaded one.
pub const DEFAULT_AVATAR: &str = "images/icons8-avatar-96.png";

/// Relative path of a user's avatar image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "images/icons8-avatar-96.png")]
pub struct Avatar(String);

impl Avatar {
    /// Validate a non-empty avatar path.
    pub fn new(raw: impl Into<String>) -> Result<Self, UserValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(UserValidationError::EmptyAvatar);
        }
        Ok(Self(raw))
    }

    /// Whether this is the shared default image.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_AVATAR
    }

    /// Borrow the path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for Avatar {
    fn default() -> Self {
        Self(DEFAULT_AVATAR.to_owned())
    }
}

impl From<Avatar> for String {
    fn from(value: Avatar) -> Self {
        value.0
    }
}

impl TryFrom<String> for Avatar {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Geographic position of a user.
///
/// Serialises as a GeoJSON point whose coordinates are `[latitude, longitude]`.
///
/// # Examples
/// ```
/// use beacon::domain::GeoPoint;
/// use serde_json::json;
///
/// let point = GeoPoint::new(51.5, -0.12).unwrap();
/// assert_eq!(
///     serde_json::to_value(point).unwrap(),
///     json!({ "type": "Point", "coordinates": [51.5, -0.12] })
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Validate coordinate ranges and construct a point.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, UserValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(UserValidationError::LatitudeOutOfRange);
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(UserValidationError::LongitudeOutOfRange);
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Wire shape of [`GeoPoint`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    #[schema(example = "Point")]
    kind: String,
    coordinates: [f64; 2],
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(value: GeoPoint) -> Self {
        Self {
            kind: "Point".to_owned(),
            coordinates: [value.latitude, value.longitude],
        }
    }
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = UserValidationError;

    fn try_from(value: GeoJsonPoint) -> Result<Self, Self::Error> {
        let [latitude, longitude] = value.coordinates;
        Self::new(latitude, longitude)
    }
}

/// Cached view of a friend stored inside the owner's `friends` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FriendSummary {
    pub id: UserId,
    pub username: Username,
    pub avatar: Avatar,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Entry in `allowed_tracks`: someone who lets the owner see their location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackGrant {
    pub username: Username,
    pub avatar: Avatar,
    #[schema(value_type = Option<GeoJsonPoint>)]
    pub location: Option<GeoPoint>,
}

/// Entry in `tracking_me`: someone the owner lets see their location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackGrantee {
    pub username: Username,
    pub avatar: Avatar,
}

/// Application user.
///
/// ## Invariants
/// - `username` and `email` are unique across users (enforced by repositories).
/// - `allowed_tracks` and `tracking_me` mirror each other across users:
///   `B ∈ A.allowed_tracks` exactly when `A ∈ B.tracking_me`.
/// - `friends` is NOT guaranteed symmetric; each side keeps its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub full_name: String,
    pub email: Email,
    pub password_hash: String,
    pub avatar: Avatar,
    pub friends: BTreeMap<UserId, FriendSummary>,
    pub allowed_tracks: BTreeMap<UserId, TrackGrant>,
    pub tracking_me: BTreeMap<UserId, TrackGrantee>,
    pub location: Option<GeoPoint>,
    pub session_token: Option<SessionToken>,
    pub reset_token: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a freshly registered user with empty relationship maps.
    #[must_use]
    pub fn register(
        id: UserId,
        username: Username,
        full_name: String,
        email: Email,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            full_name,
            email,
            password_hash,
            avatar: Avatar::default(),
            friends: BTreeMap::new(),
            allowed_tracks: BTreeMap::new(),
            tracking_me: BTreeMap::new(),
            location: None,
            session_token: None,
            reset_token: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Summary written into a friend's `friends` map.
    #[must_use]
    pub fn friend_summary(&self) -> FriendSummary {
        FriendSummary {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            last_seen: self.last_seen,
        }
    }

    /// Entry written into a grantee's `allowed_tracks` map.
    #[must_use]
    pub fn track_grant(&self) -> TrackGrant {
        TrackGrant {
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            location: self.location,
        }
    }

    /// Entry written into a granter's `tracking_me` map.
    #[must_use]
    pub fn track_grantee(&self) -> TrackGrantee {
        TrackGrantee {
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Whether `other` appears in this user's friends map.
    #[must_use]
    pub fn is_friend_of(&self, other: &UserId) -> bool {
        self.friends.contains_key(other)
    }

    /// Find a cached friend entry by username.
    #[must_use]
    pub fn friend_by_username(&self, username: &str) -> Option<&FriendSummary> {
        self.friends
            .values()
            .find(|summary| summary.username.as_str() == username)
    }

    /// Apply a single update operation in place.
    pub fn apply(&mut self, update: &UserUpdate, now: DateTime<Utc>) {
        match update {
            UserUpdate::SetUsername(username) => self.username = username.clone(),
            UserUpdate::SetFullName(name) => self.full_name.clone_from(name),
            UserUpdate::SetAvatar(avatar) => self.avatar = avatar.clone(),
            UserUpdate::SetLocation(point) => self.location = Some(*point),
            UserUpdate::ClearLocation => self.location = None,
            UserUpdate::SetSessionToken(token) => self.session_token = Some(*token),
            UserUpdate::ClearSessionToken => self.session_token = None,
            UserUpdate::SetResetToken(token) => self.reset_token = Some(token.clone()),
            UserUpdate::SetPasswordHash(hash) => {
                self.password_hash.clone_from(hash);
                self.reset_token = None;
            }
            UserUpdate::TouchLastSeen => self.last_seen = Some(now),
        }
        self.updated_at = now;
    }
}

/// Closed set of attribute updates accepted by user repositories.
///
/// Setting the password hash also clears any outstanding reset token.
#[derive(Debug, Clone, PartialEq)]
pub enum UserUpdate {
    SetUsername(Username),
    SetFullName(String),
    SetAvatar(Avatar),
    SetLocation(GeoPoint),
    ClearLocation,
    SetSessionToken(SessionToken),
    ClearSessionToken,
    SetResetToken(String),
    SetPasswordHash(String),
    TouchLastSeen,
}

impl UserUpdate {
    /// Whether friends hold a denormalised copy of the changed attribute.
    #[must_use]
    pub fn affects_summaries(&self) -> bool {
        matches!(
            self,
            Self::SetUsername(_)
                | Self::SetAvatar(_)
                | Self::SetLocation(_)
                | Self::ClearLocation
                | Self::TouchLastSeen
        )
    }
}

#[cfg(test)]
#[path = "user/tests.rs"]
mod tests;

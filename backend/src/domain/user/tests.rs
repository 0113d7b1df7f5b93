//! Tests for user value types and in-place updates.

use super::*;
use chrono::TimeZone;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

#[fixture]
fn alice(now: DateTime<Utc>) -> User {
    User::register(
        UserId::random(),
        Username::new("alice").expect("valid username"),
        "Alice Liddell".to_owned(),
        Email::new("Alice@Example.com").expect("valid email"),
        "hash".to_owned(),
        now,
    )
}

#[rstest]
#[case("ab", UserValidationError::UsernameTooShort { min: USERNAME_MIN })]
#[case("a".repeat(USERNAME_MAX + 1), UserValidationError::UsernameTooLong { max: USERNAME_MAX })]
#[case("bad name", UserValidationError::UsernameInvalidCharacters)]
#[case("semi;colon", UserValidationError::UsernameInvalidCharacters)]
fn username_rejects_invalid_values(
    #[case] raw: impl Into<String>,
    #[case] expected: UserValidationError,
) {
    assert_eq!(Username::new(raw), Err(expected));
}

#[rstest]
#[case("bob")]
#[case("bob.smith")]
#[case("bob_smith-2")]
fn username_accepts_valid_values(#[case] raw: &str) {
    assert_eq!(Username::new(raw).expect("valid").as_str(), raw);
}

#[rstest]
fn email_is_normalised_to_lowercase() {
    let email = Email::new("  Bob@Example.COM ").expect("valid email");
    assert_eq!(email.as_str(), "bob@example.com");
}

#[rstest]
#[case("bob")]
#[case("bob@example")]
#[case("@example.com")]
fn email_rejects_malformed_addresses(#[case] raw: &str) {
    assert_eq!(Email::new(raw), Err(UserValidationError::InvalidEmail));
}

#[rstest]
#[case("bob@example.com", true)]
#[case("bob", false)]
#[case("bob.smith", false)]
fn email_detection_distinguishes_usernames(#[case] raw: &str, #[case] expected: bool) {
    assert_eq!(looks_like_email(raw), expected);
}

#[rstest]
fn user_id_rejects_padded_and_malformed_values() {
    assert_eq!(UserId::new(""), Err(UserValidationError::EmptyId));
    assert_eq!(
        UserId::new(" 3fa85f64-5717-4562-b3fc-2c963f66afa6"),
        Err(UserValidationError::InvalidId)
    );
    assert_eq!(UserId::new("nope"), Err(UserValidationError::InvalidId));
}

#[rstest]
fn geo_point_round_trips_through_geojson() {
    let point = GeoPoint::new(6.5, 3.4).expect("valid point");
    let value = serde_json::to_value(point).expect("serialise");
    assert_eq!(value, json!({ "type": "Point", "coordinates": [6.5, 3.4] }));
    let back: GeoPoint = serde_json::from_value(value).expect("deserialise");
    assert_eq!(back, point);
}

#[rstest]
fn geo_point_rejects_out_of_range_latitude() {
    let payload = json!({ "type": "Point", "coordinates": [91.0, 0.0] });
    assert!(serde_json::from_value::<GeoPoint>(payload).is_err());
}

#[rstest]
fn register_uses_default_avatar_and_empty_maps(alice: User) {
    assert!(alice.avatar.is_default());
    assert!(alice.friends.is_empty());
    assert!(alice.allowed_tracks.is_empty());
    assert!(alice.tracking_me.is_empty());
    assert_eq!(alice.email.as_str(), "alice@example.com");
}

#[rstest]
fn setting_password_hash_clears_reset_token(mut alice: User, now: DateTime<Utc>) {
    alice.apply(&UserUpdate::SetResetToken("abcd1234".to_owned()), now);
    assert_eq!(alice.reset_token.as_deref(), Some("abcd1234"));

    alice.apply(&UserUpdate::SetPasswordHash("new-hash".to_owned()), now);
    assert_eq!(alice.password_hash, "new-hash");
    assert!(alice.reset_token.is_none());
}

#[rstest]
fn location_updates_set_and_clear(mut alice: User, now: DateTime<Utc>) {
    let point = GeoPoint::new(1.0, 2.0).expect("valid point");
    alice.apply(&UserUpdate::SetLocation(point), now);
    assert_eq!(alice.track_grant().location, Some(point));

    alice.apply(&UserUpdate::ClearLocation, now);
    assert!(alice.location.is_none());
}

#[rstest]
#[case(UserUpdate::SetAvatar(Avatar::new("images/a.png").expect("valid avatar")), true)]
#[case(UserUpdate::ClearLocation, true)]
#[case(UserUpdate::SetFullName("A".to_owned()), false)]
#[case(UserUpdate::ClearSessionToken, false)]
fn only_denormalised_attributes_affect_summaries(
    #[case] update: UserUpdate,
    #[case] expected: bool,
) {
    assert_eq!(update.affects_summaries(), expected);
}

#[rstest]
fn friend_lookup_by_username_uses_cached_summary(mut alice: User) {
    let bob_id = UserId::random();
    alice.friends.insert(
        bob_id,
        FriendSummary {
            id: bob_id,
            username: Username::new("bob").expect("valid username"),
            avatar: Avatar::default(),
            last_seen: None,
        },
    );

    assert!(alice.is_friend_of(&bob_id));
    assert_eq!(alice.friend_by_username("bob").map(|f| f.id), Some(bob_id));
    assert!(alice.friend_by_username("carol").is_none());
}

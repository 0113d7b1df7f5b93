//! Tests for the conversation service.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{ConversationPersistenceError, MockConversationRepository};
use crate::domain::{Email, ErrorCode};

struct FixtureClock;

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }
}

fn user(name: &str) -> User {
    User::register(
        UserId::random(),
        Username::new(name).expect("valid username"),
        name.to_owned(),
        Email::new(format!("{name}@example.com")).expect("valid email"),
        "hash".to_owned(),
        FixtureClock.utc(),
    )
}

#[fixture]
fn pair_of_users() -> (User, User) {
    (user("alice"), user("bob"))
}

fn service(repo: MockConversationRepository) -> ConversationService {
    ConversationService::new(Arc::new(repo), Arc::new(FixtureClock))
}

fn conversation_between(a: &User, b: &User) -> Conversation {
    Conversation::start(
        ParticipantPair::new(a.id, b.id).expect("pair"),
        [&a.username, &b.username],
        FixtureClock.utc(),
    )
}

#[rstest]
#[tokio::test]
async fn find_or_create_returns_existing_without_creating(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let existing = conversation_between(&alice, &bob);
    let existing_id = existing.id;
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_participants()
        .times(1)
        .return_once(move |_| Ok(Some(existing)));
    repo.expect_create_if_absent().never();

    let found = service(repo)
        .find_or_create(&bob, &alice)
        .await
        .expect("found");
    assert_eq!(found.id, existing_id);
}

#[rstest]
#[tokio::test]
async fn find_or_create_returns_the_winner_of_a_race(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let winner = conversation_between(&alice, &bob);
    let winner_id = winner.id;
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_participants()
        .times(1)
        .return_once(|_| Ok(None));
    repo.expect_create_if_absent()
        .withf(|candidate| candidate.is_in_chat.values().all(|flag| !flag))
        .times(1)
        .return_once(move |_| Ok(winner));

    let stored = service(repo)
        .find_or_create(&alice, &bob)
        .await
        .expect("created");
    assert_eq!(stored.id, winner_id);
}

#[rstest]
#[tokio::test]
async fn find_or_create_rejects_self_conversation(pair_of_users: (User, User)) {
    let (alice, _) = pair_of_users;
    let error = service(MockConversationRepository::new())
        .find_or_create(&alice, &alice)
        .await
        .expect_err("self");
    assert_eq!(error.code(), ErrorCode::InvalidRequest);
}

#[rstest]
#[tokio::test]
async fn append_message_is_a_no_op_when_conversation_missing(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let mut repo = MockConversationRepository::new();
    repo.expect_append_message()
        .times(1)
        .return_once(|_, _| Ok(false));

    let appended = service(repo)
        .append_message(
            &ConversationId::random(),
            &alice.username,
            &bob.username,
            "hello",
            ContentType::Text,
        )
        .await
        .expect("append");
    assert!(appended.is_none());
}

#[rstest]
#[tokio::test]
async fn append_message_returns_the_stored_message(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let mut repo = MockConversationRepository::new();
    repo.expect_append_message()
        .withf(|_, message| message.content == "hello" && !message.read)
        .times(1)
        .return_once(|_, _| Ok(true));

    let message = service(repo)
        .append_message(
            &ConversationId::random(),
            &alice.username,
            &bob.username,
            "hello",
            ContentType::Text,
        )
        .await
        .expect("append")
        .expect("stored");
    assert_eq!(message.sender, alice.username);
    assert_eq!(message.receiver, bob.username);
    assert_eq!(message.created_at, FixtureClock.utc());
}

#[rstest]
#[tokio::test]
async fn append_rejects_blank_content(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let error = service(MockConversationRepository::new())
        .append_message(
            &ConversationId::random(),
            &alice.username,
            &bob.username,
            "  ",
            ContentType::Text,
        )
        .await
        .expect_err("blank");
    assert_eq!(error.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn mark_many_read_skips_empty_batches() {
    let mut repo = MockConversationRepository::new();
    repo.expect_mark_read().never();
    let changed = service(repo)
        .mark_many_read(&ConversationId::random(), &[])
        .await
        .expect("mark");
    assert_eq!(changed, 0);
}

#[tokio::test]
async fn messages_of_missing_conversation_is_not_found() {
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_id().times(1).return_once(|_| Ok(None));
    let error = service(repo)
        .messages(&ConversationId::random())
        .await
        .expect_err("missing");
    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn update_presence_clears_everything_for_non_mutual_friends(pair_of_users: (User, User)) {
    let (mut alice, bob) = pair_of_users;
    alice.friends.insert(bob.id, bob.friend_summary());
    let mut repo = MockConversationRepository::new();
    repo.expect_set_in_chat().never();
    repo.expect_clear_in_chat_for()
        .withf(|_, username| username == "alice")
        .times(1)
        .return_once(|_, _| Ok(2));

    let outcome = service(repo)
        .update_presence(&alice, Some(&bob), true)
        .await
        .expect("presence");
    assert_eq!(outcome, PresenceUpdate::ClearedAll);
}

#[rstest]
#[tokio::test]
async fn update_presence_sets_flag_for_mutual_friends(pair_of_users: (User, User)) {
    let (mut alice, mut bob) = pair_of_users;
    alice.friends.insert(bob.id, bob.friend_summary());
    bob.friends.insert(alice.id, alice.friend_summary());
    let existing = conversation_between(&alice, &bob);
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_participants()
        .times(1)
        .return_once(move |_| Ok(Some(existing)));
    repo.expect_set_in_chat()
        .withf(|_, username, in_chat| username == "alice" && *in_chat)
        .times(1)
        .return_once(|_, _, _| Ok(true));

    let outcome = service(repo)
        .update_presence(&alice, Some(&bob), true)
        .await
        .expect("presence");
    assert_eq!(outcome, PresenceUpdate::Updated);
}

#[rstest]
#[tokio::test]
async fn has_unread_from_checks_messages_addressed_to_user(pair_of_users: (User, User)) {
    let (alice, bob) = pair_of_users;
    let mut conversation = conversation_between(&alice, &bob);
    conversation.messages.push(Message::new(
        bob.username.clone(),
        alice.username.clone(),
        "ping".to_owned(),
        ContentType::Text,
        FixtureClock.utc(),
    ));
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_participants()
        .times(2)
        .returning(move |_| Ok(Some(conversation.clone())));

    let service = service(repo);
    assert!(service.has_unread_from(&alice, &bob.id).await.expect("alice"));
    assert!(!service.has_unread_from(&bob, &alice.id).await.expect("bob"));
}

#[tokio::test]
async fn connection_failures_surface_as_service_unavailable() {
    let mut repo = MockConversationRepository::new();
    repo.expect_find_by_id()
        .times(1)
        .return_once(|_| Err(ConversationPersistenceError::connection("refused")));
    let error = service(repo)
        .find(&ConversationId::random())
        .await
        .expect_err("unavailable");
    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}
